//! Project and per-user configuration.
//!
//! The backend serves the project configuration merged with the current
//! user's overrides. Fields that the legacy JSON left loosely typed (for
//! example `thumbnails: string | false`) are modelled as sum types here.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use crate::{IrisError, MaskArea, MaskShape, Result};

/// Message shown when preferences are saved without any input band
pub const NEED_ONE_BAND_MESSAGE: &str = "[Segmentation] Need at least one band as input!";

/// Complete project configuration as served to the segmentation page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IrisConfig {
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub debug: bool,
    pub images: ImagesConfig,
    #[serde(default)]
    pub views: BTreeMap<String, ViewConfig>,
    #[serde(default)]
    pub view_groups: BTreeMap<String, Vec<String>>,
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub classes: Vec<ClassDef>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

impl IrisConfig {
    /// Get the JSON schema for the configuration
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(IrisConfig)
    }

    pub fn mask_shape(&self) -> MaskShape {
        self.segmentation.mask_shape
    }

    /// Mask area, falling back to the whole image when unset
    pub fn mask_area(&self) -> MaskArea {
        self.segmentation
            .mask_area
            .unwrap_or_else(|| MaskArea::full(self.images.shape))
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Look up the views of a named view group, skipping unknown names
    pub fn views_in_group(&self, group: &str) -> Vec<(&str, &ViewConfig)> {
        self.view_groups
            .get(group)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| {
                        self.views
                            .get_key_value(name)
                            .map(|(key, view)| (key.as_str(), view))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Structural checks on shapes and areas
    pub fn validate(&self) -> Result<()> {
        self.images.shape.validate()?;
        self.segmentation.mask_shape.validate()?;
        if let Some(area) = self.segmentation.mask_area {
            area.validate()?;
        }
        Ok(())
    }
}

/// Location of the image files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ImagePath {
    /// One path template for every file, e.g. `images/{id}/image.tif`
    Single(String),
    /// Per-file templates keyed by file alias
    PerFile(BTreeMap<String, String>),
}

/// Optional path template that can be switched off with `false`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "PathSettingRepr", into = "PathSettingRepr")]
pub enum PathSetting {
    #[default]
    Disabled,
    Single(String),
    PerFile(BTreeMap<String, String>),
}

impl PathSetting {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
enum PathSettingRepr {
    Flag(bool),
    Single(String),
    PerFile(BTreeMap<String, String>),
}

impl TryFrom<PathSettingRepr> for PathSetting {
    type Error = String;

    fn try_from(repr: PathSettingRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            PathSettingRepr::Flag(false) => Ok(Self::Disabled),
            PathSettingRepr::Flag(true) => {
                Err("expected a path template or `false`, found `true`".to_string())
            }
            PathSettingRepr::Single(path) => Ok(Self::Single(path)),
            PathSettingRepr::PerFile(paths) => Ok(Self::PerFile(paths)),
        }
    }
}

impl From<PathSetting> for PathSettingRepr {
    fn from(setting: PathSetting) -> Self {
        match setting {
            PathSetting::Disabled => Self::Flag(false),
            PathSetting::Single(path) => Self::Single(path),
            PathSetting::PerFile(paths) => Self::PerFile(paths),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ImagesConfig {
    pub path: ImagePath,
    #[serde(default)]
    #[schemars(with = "PathSettingRepr")]
    pub metadata: PathSetting,
    #[serde(default)]
    #[schemars(with = "PathSettingRepr")]
    pub thumbnails: PathSetting,
    /// Image dimensions in pixels
    pub shape: MaskShape,
}

/// A named rendering of an image
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ViewConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Band expressions, e.g. `$Sentinel2.B4`
    #[serde(default)]
    pub data: Vec<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stretch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vmin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vmax: Option<f64>,
}

#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MaskEncoding {
    Integer,
    Binary,
    #[default]
    Rgb,
    Rgba,
}

#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScoreKind {
    #[default]
    F1,
    Jaccard,
    Accuracy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentationConfig {
    /// Mask file template on the backend, e.g. `masks/{id}.png`
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub mask_encoding: MaskEncoding,
    #[serde(default)]
    pub mask_area: Option<MaskArea>,
    pub mask_shape: MaskShape,
    #[serde(default)]
    pub score: ScoreKind,
    #[serde(default = "default_true")]
    pub prioritise_unmarked_images: bool,
    #[serde(default = "default_unverified_threshold")]
    pub unverified_threshold: u32,
    #[serde(default)]
    pub test_images: Option<Vec<String>>,
    #[serde(default)]
    pub ai_model: AiModelConfig,
}

fn default_true() -> bool {
    true
}

fn default_unverified_threshold() -> u32 {
    1
}

/// Grid resolution used for the spatial meshgrid features
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
pub enum MeshgridCells {
    #[default]
    #[serde(rename = "3x3")]
    #[strum(serialize = "3x3")]
    Cells3,
    #[serde(rename = "5x5")]
    #[strum(serialize = "5x5")]
    Cells5,
    #[serde(rename = "7x7")]
    #[strum(serialize = "7x7")]
    Cells7,
    #[serde(rename = "10x10")]
    #[strum(serialize = "10x10")]
    Cells10,
    #[serde(rename = "20x20")]
    #[strum(serialize = "20x20")]
    Cells20,
    #[serde(rename = "pixelwise")]
    #[strum(serialize = "pixelwise")]
    Pixelwise,
}

/// Hyper-parameters of the backend's gradient-boosting model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AiModelConfig {
    /// Input bands; `None` means "all bands of the project"
    pub bands: Option<Vec<String>>,
    #[schemars(range(min = 0.1, max = 1.0))]
    pub train_ratio: f64,
    #[schemars(range(min = 100, max = 50000))]
    pub max_train_pixels: u32,
    #[schemars(range(min = 10, max = 200))]
    pub n_estimators: u32,
    #[schemars(range(min = 5, max = 100))]
    pub max_depth: u32,
    #[schemars(range(min = 5, max = 100))]
    pub n_leaves: u32,
    /// Percentage of agreeing neighbours required to keep a prediction
    #[schemars(range(min = 0, max = 100))]
    pub suppression_threshold: u32,
    pub suppression_filter_size: u32,
    pub suppression_default_class: u32,
    pub use_edge_filter: bool,
    pub use_superpixels: bool,
    pub use_meshgrid: bool,
    pub meshgrid_cells: MeshgridCells,
}

impl Default for AiModelConfig {
    fn default() -> Self {
        Self {
            bands: None,
            train_ratio: 0.8,
            max_train_pixels: 20000,
            n_estimators: 20,
            max_depth: 10,
            n_leaves: 10,
            suppression_threshold: 0,
            suppression_filter_size: 5,
            suppression_default_class: 0,
            use_edge_filter: false,
            use_superpixels: false,
            use_meshgrid: false,
            meshgrid_cells: MeshgridCells::default(),
        }
    }
}

impl AiModelConfig {
    pub const SUPPRESSION_FILTER_SIZES: [u32; 3] = [3, 5, 7];

    /// Selected bands, or an empty slice when unresolved
    pub fn bands(&self) -> &[String] {
        self.bands.as_deref().unwrap_or_default()
    }

    /// Move bands from the excluded list into the model inputs
    pub fn include_bands(&mut self, selected: &[String]) {
        let bands = self.bands.get_or_insert_with(Vec::new);
        for band in selected {
            if !bands.contains(band) {
                bands.push(band.clone());
            }
        }
    }

    /// Remove bands from the model inputs
    pub fn exclude_bands(&mut self, selected: &[String]) {
        if let Some(bands) = self.bands.as_mut() {
            bands.retain(|band| !selected.contains(band));
        }
    }

    /// Checks run before the preferences form is submitted. Unset bands
    /// mean "all bands" and pass; an explicitly empty list fails.
    pub fn validate_for_save(&self) -> Result<()> {
        if matches!(self.bands.as_deref(), Some([])) {
            return Err(IrisError::Validation(NEED_ONE_BAND_MESSAGE.to_string()));
        }

        let mut problems = Vec::new();
        if !(0.1..=1.0).contains(&self.train_ratio) {
            problems.push(format!("train_ratio {} outside 0.1..=1.0", self.train_ratio));
        }
        if !(100..=50000).contains(&self.max_train_pixels) {
            problems.push(format!("max_train_pixels {} outside 100..=50000", self.max_train_pixels));
        }
        if !(10..=200).contains(&self.n_estimators) {
            problems.push(format!("n_estimators {} outside 10..=200", self.n_estimators));
        }
        if !(5..=100).contains(&self.max_depth) {
            problems.push(format!("max_depth {} outside 5..=100", self.max_depth));
        }
        if !(5..=100).contains(&self.n_leaves) {
            problems.push(format!("n_leaves {} outside 5..=100", self.n_leaves));
        }
        if self.suppression_threshold > 100 {
            problems.push(format!("suppression_threshold {} above 100", self.suppression_threshold));
        }
        if !Self::SUPPRESSION_FILTER_SIZES.contains(&self.suppression_filter_size) {
            problems.push(format!(
                "suppression_filter_size {} not one of 3, 5, 7",
                self.suppression_filter_size
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(IrisError::Validation(format!(
                "[Segmentation] {}",
                problems.join("; ")
            )))
        }
    }
}

/// RGB or RGBA colour as written in the project file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ClassColour {
    Rgba([u8; 4]),
    Rgb([u8; 3]),
}

impl ClassColour {
    /// RGBA value; alpha defaults to opaque
    pub fn rgba(&self) -> [u8; 4] {
        match *self {
            Self::Rgba(rgba) => rgba,
            Self::Rgb([r, g, b]) => [r, g, b, 255],
        }
    }
}

impl Default for ClassColour {
    fn default() -> Self {
        Self::Rgba([0, 0, 0, 255])
    }
}

/// A segmentation class; its position in the class list is the mask value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClassDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub colour: ClassColour,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_colour: Option<ClassColour>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_colour: Option<String>,
}

/// Payload of `GET /segmentation/api/user-config`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UserConfigResponse {
    pub config: IrisConfig,
    #[serde(default)]
    pub all_bands: Vec<String>,
    #[serde(default)]
    pub is_admin: bool,
}

impl UserConfigResponse {
    /// Resolve an unset band list to every band of the project
    pub fn resolve_bands(mut self) -> Self {
        let ai_model = &mut self.config.segmentation.ai_model;
        if ai_model.bands.is_none() {
            ai_model.bands = Some(self.all_bands.clone());
        }
        self
    }

    /// Bands available but not currently used by the model
    pub fn excluded_bands(&self) -> Vec<&str> {
        let included = self.config.segmentation.ai_model.bands();
        self.all_bands
            .iter()
            .filter(|band| !included.contains(band))
            .map(String::as_str)
            .collect()
    }
}
