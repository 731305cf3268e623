//! Backend URL resolution.
//!
//! Requests go to the profile's origin. When a custom backend base is
//! configured it is tried first and the origin becomes a fallback that is
//! only used when the custom base cannot be reached at all.

use reqwest::Url;

use crate::error::{ClientError, Result};

/// Environment variable holding an optional custom backend base URL
pub const BACKEND_URL_ENV: &str = "IRIS_BACKEND_URL";

/// A backend path: encoded segments, optional trailing slash and query pairs
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApiPath {
    segments: Vec<String>,
    trailing_slash: bool,
    query: Vec<(String, String)>,
}

impl ApiPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_trailing_slash(mut self) -> Self {
        self.trailing_slash = true;
        self
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Resolve against a base, keeping any path prefix the base carries
    pub fn resolve(&self, base: &Url) -> Result<Url> {
        let mut url = base.clone();
        url.set_query(None);
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ClientError::Url(base.to_string()))?;
            path.pop_if_empty();
            path.extend(&self.segments);
            if self.trailing_slash {
                path.push("");
            }
        }
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendUrl {
    origin: Url,
    custom: Option<Url>,
}

impl BackendUrl {
    pub fn new(origin: &str) -> Result<Self> {
        Ok(Self {
            origin: parse_base(origin)?,
            custom: None,
        })
    }

    /// Set the custom base; blank values mean none
    pub fn with_custom_base(mut self, base: Option<&str>) -> Result<Self> {
        self.custom = match base.map(str::trim) {
            Some(base) if !base.is_empty() => Some(parse_base(base)?),
            _ => None,
        };
        Ok(self)
    }

    /// Read the custom base from `IRIS_BACKEND_URL`
    pub fn from_env(origin: &str) -> Result<Self> {
        let custom = std::env::var(BACKEND_URL_ENV).ok();
        Self::new(origin)?.with_custom_base(custom.as_deref())
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn custom(&self) -> Option<&Url> {
        self.custom.as_ref()
    }

    pub fn has_custom_backend(&self) -> bool {
        self.custom.is_some()
    }

    /// URLs to try in order, without duplicates
    pub fn candidates(&self, path: &ApiPath) -> Result<Vec<Url>> {
        let mut urls = Vec::with_capacity(2);
        if let Some(custom) = &self.custom {
            urls.push(path.resolve(custom)?);
        }
        let origin = path.resolve(&self.origin)?;
        if !urls.contains(&origin) {
            urls.push(origin);
        }
        Ok(urls)
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| ClientError::Url(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::Url(format!("{raw}: expected an http(s) URL")));
    }
    Ok(url)
}
