//! User, action and image DTOs returned by the backend.

use chrono::{DateTime, NaiveDateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{IrisConfig, IrisError, Result};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct SegmentationStats {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub score_unverified: f64,
    #[serde(default)]
    pub n_masks: u32,
}

/// Account of the logged-in annotator (`GET /user/get/current`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IrisUser {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub tested: bool,
    /// Creation time as formatted by the backend
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub image_seed: i64,
    #[serde(default)]
    pub segmentation: SegmentationStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<IrisConfig>,
}

impl IrisUser {
    pub fn role(&self) -> &'static str {
        if self.admin { "Administrator" } else { "Annotator" }
    }

    /// Parse `created`, accepting RFC 3339, RFC 2822 and the bare
    /// `YYYY-MM-DD HH:MM:SS[.f]` format the backend emits for naive times.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.created.trim();
        if raw.is_empty() {
            return None;
        }
        DateTime::parse_from_rfc3339(raw)
            .or_else(|_| DateTime::parse_from_rfc2822(raw))
            .map(|time| time.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }
}

/// Per-task score summary of an image
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct TaskScore {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub current_user_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user_score_unverified: Option<bool>,
}

/// Payload of `GET /image_info/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ImageInfoSummary {
    pub id: String,
    #[serde(default)]
    pub segmentation: TaskScore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<TaskScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection: Option<TaskScore>,
}

impl ImageInfoSummary {
    /// Score label shown next to the AI button; "0" when not scored yet
    pub fn score_label(&self) -> String {
        match self.segmentation.current_user_score {
            Some(score) => score.to_string(),
            None => "0".to_string(),
        }
    }
}

/// One annotation action (a saved mask) of a user on an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActionInfo {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub image_id: String,
    pub user_id: u64,
    #[serde(default)]
    pub last_modification: String,
    #[serde(default)]
    pub time_spent: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub unverified: bool,
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub difficulty: u32,
}

/// Image id and location embedded in the segmentation page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentationBootstrap {
    pub image_id: String,
    pub image_location: [f64; 2],
}

impl SegmentationBootstrap {
    /// Extract `'image_id'` and `'image_location'` from the page's inline
    /// script. A missing or malformed location falls back to `[0, 0]`.
    pub fn from_html(html: &str) -> Result<Self> {
        let image_id = scalar_after_key(html, "'image_id'").ok_or_else(|| {
            IrisError::Parse("Unable to parse image id from segmentation bootstrap response".to_string())
        })?;

        let image_location = array_after_key(html, "'image_location'")
            .and_then(|raw| serde_json::from_str::<Vec<f64>>(raw).ok())
            .and_then(|values| match values.as_slice() {
                [x, y] => Some([*x, *y]),
                _ => None,
            })
            .unwrap_or([0.0, 0.0]);

        Ok(Self {
            image_id,
            image_location,
        })
    }
}

/// Text following `key` and a colon, with surrounding whitespace removed,
/// for the first occurrence of `key` that is followed by one
fn after_colon<'a>(html: &'a str, key: &str) -> Option<&'a str> {
    html.match_indices(key).find_map(|(start, _)| {
        html[start + key.len()..]
            .trim_start()
            .strip_prefix(':')
            .map(str::trim_start)
    })
}

fn scalar_after_key(html: &str, key: &str) -> Option<String> {
    let rest = after_colon(html, key)?;
    let value = if let Some(quoted) = rest.strip_prefix('"') {
        &quoted[..quoted.find('"')?]
    } else {
        let end = rest
            .find(|c: char| c.is_whitespace() || c == ',' || c == '}')
            .unwrap_or(rest.len());
        &rest[..end]
    };
    (!value.is_empty()).then(|| value.to_string())
}

fn array_after_key<'a>(html: &'a str, key: &str) -> Option<&'a str> {
    let rest = after_colon(html, key)?;
    if !rest.starts_with('[') {
        return None;
    }
    let end = rest.find(']')?;
    Some(&rest[..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_quoted_id() {
        let html = r#"<script>var vars = {'image_id': "tile_0042", 'image_location': [51.5, -0.12]};</script>"#;
        let bootstrap = SegmentationBootstrap::from_html(html).unwrap();
        assert_eq!(bootstrap.image_id, "tile_0042");
        assert_eq!(bootstrap.image_location, [51.5, -0.12]);
    }

    #[test]
    fn test_bootstrap_bare_id_without_location() {
        let html = "vars = {'image_id' : 17, 'other': 1}";
        let bootstrap = SegmentationBootstrap::from_html(html).unwrap();
        assert_eq!(bootstrap.image_id, "17");
        assert_eq!(bootstrap.image_location, [0.0, 0.0]);
    }

    #[test]
    fn test_bootstrap_bad_location_falls_back() {
        let html = "{'image_id': \"a\", 'image_location': [1, 2, 3]}";
        let bootstrap = SegmentationBootstrap::from_html(html).unwrap();
        assert_eq!(bootstrap.image_location, [0.0, 0.0]);
    }

    #[test]
    fn test_bootstrap_skips_key_without_colon() {
        let html = r#"<p>'image_id'</p><script>vars = {'image_id': "tile_7"};</script>"#;
        let bootstrap = SegmentationBootstrap::from_html(html).unwrap();
        assert_eq!(bootstrap.image_id, "tile_7");
    }

    #[test]
    fn test_bootstrap_missing_id() {
        assert!(SegmentationBootstrap::from_html("<html></html>").is_err());
    }

    #[test]
    fn test_user_created_formats() {
        let mut user: IrisUser = serde_json::from_str(r#"{"id": 1, "name": "ann"}"#).unwrap();
        assert!(user.created_at().is_none());
        assert_eq!(user.role(), "Annotator");

        user.created = "2024-03-01 12:30:00.250".to_string();
        assert_eq!(user.created_at().unwrap().to_rfc3339(), "2024-03-01T12:30:00.250+00:00");

        user.created = "Fri, 01 Mar 2024 12:30:00 GMT".to_string();
        assert!(user.created_at().is_some());
    }

    #[test]
    fn test_score_label() {
        let info: ImageInfoSummary = serde_json::from_str(
            r#"{"id": "x", "segmentation": {"count": 2, "current_user_score": null}}"#,
        )
        .unwrap();
        assert_eq!(info.score_label(), "0");
    }

    #[test]
    fn test_action_type_field() {
        let action: ActionInfo = serde_json::from_str(
            r#"{"id": 3, "type": "segmentation", "image_id": "x", "user_id": 1, "score": 0.5}"#,
        )
        .unwrap();
        assert_eq!(action.kind, "segmentation");
        assert!(action.notes.is_none());
    }
}
