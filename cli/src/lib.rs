use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use iris_common::{ClassDef, MaskShape};
use mask::{DrawStats, EditCommand};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Missing backend URL: set it in the profile, with --backend-url or IRIS_URL")]
    MissingBackendUrl,
    #[error("Invalid shape '{0}', expected WIDTHxHEIGHT")]
    InvalidShape(String),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("masks")
}

fn default_timeout_secs() -> u64 {
    10
}

/// Connection settings of the `iris` binary
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Profile {
    /// Origin of the IRIS server, e.g. `http://localhost:5000`
    #[serde(default)]
    pub backend_url: String,
    /// Alternative base tried before the origin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_backend_url: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Where pulled masks and rendered overlays are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            custom_backend_url: None,
            username: String::new(),
            password: None,
            output_dir: default_output_dir(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Profile {
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self, CliError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Auto-detect file format and load the profile
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let path = path.as_ref();
        let format = ProfileFormat::of(path)?;
        let content = fs::read_to_string(path)?;
        match format {
            ProfileFormat::Toml => Self::from_toml(&content),
            ProfileFormat::Json => Self::from_json(&content),
        }
    }

    pub fn to_toml(&self) -> Result<String, CliError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn to_json(&self) -> Result<String, CliError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CliError> {
        let path = path.as_ref();
        let content = match ProfileFormat::of(path)? {
            ProfileFormat::Toml => self.to_toml()?,
            ProfileFormat::Json => self.to_json()?,
        };
        fs::write(path, content)?;
        Ok(())
    }

    /// Command-line values win over the file
    pub fn with_overrides(
        mut self,
        backend_url: Option<String>,
        custom_backend_url: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        if let Some(url) = backend_url {
            self.backend_url = url;
        }
        if custom_backend_url.is_some() {
            self.custom_backend_url = custom_backend_url;
        }
        if let Some(username) = username {
            self.username = username;
        }
        if password.is_some() {
            self.password = password;
        }
        self
    }

    pub fn validate(&self) -> Result<(), CliError> {
        if self.backend_url.trim().is_empty() {
            return Err(CliError::MissingBackendUrl);
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Credentials when both parts are present
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_str(), self.password.as_deref()) {
            ("", _) | (_, None) => None,
            (username, Some(password)) => Some((username, password)),
        }
    }

    /// `<output_dir>/<image_id>.<extension>`
    pub fn output_path(&self, image_id: &str, extension: &str) -> PathBuf {
        self.output_dir.join(format!("{image_id}.{extension}"))
    }
}

enum ProfileFormat {
    Toml,
    Json,
}

impl ProfileFormat {
    fn of(path: &Path) -> Result<Self, CliError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => Err(CliError::UnsupportedFileFormat),
        }
    }
}

/// Load a JSON array of editor commands
pub fn load_edit_script<P: AsRef<Path>>(path: P) -> Result<Vec<EditCommand>, CliError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Parse `WIDTHxHEIGHT`
pub fn parse_shape(raw: &str) -> Result<MaskShape, CliError> {
    let invalid = || CliError::InvalidShape(raw.to_string());
    let (width, height) = raw.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
    let width = width.trim().parse().map_err(|_| invalid())?;
    let height = height.trim().parse().map_err(|_| invalid())?;
    MaskShape::new(width, height).map_err(|_| invalid())
}

/// Human-readable drawing statistics of one mask
#[derive(Debug, Clone, PartialEq)]
pub struct MaskSummary {
    pub image_id: String,
    pub shape: MaskShape,
    pub total: usize,
    pub classes: Vec<(String, usize, f64)>,
}

impl MaskSummary {
    pub fn new(image_id: &str, shape: MaskShape, stats: &DrawStats, classes: &[ClassDef]) -> Self {
        let classes = classes
            .iter()
            .enumerate()
            .map(|(index, class)| {
                let count = stats.class_counts.get(index).copied().unwrap_or(0);
                (class.name.clone(), count, stats.fraction(index))
            })
            .collect();
        Self {
            image_id: image_id.to_string(),
            shape,
            total: stats.total,
            classes,
        }
    }
}

impl fmt::Display for MaskSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ({}x{}): {} user-marked pixels",
            self.image_id,
            self.shape.width(),
            self.shape.height(),
            self.total
        )?;
        for (name, count, fraction) in &self.classes {
            writeln!(f, "  {name:<16} {count:>8} {:>6.1}%", fraction * 100.0)?;
        }
        Ok(())
    }
}
