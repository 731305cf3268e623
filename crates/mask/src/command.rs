use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use crate::edits::{DEFAULT_BRUSH_SIZE, DEFAULT_ERASER_SIZE, PixelPoint};

fn default_brush_size() -> u32 {
    DEFAULT_BRUSH_SIZE
}

fn default_eraser_size() -> u32 {
    DEFAULT_ERASER_SIZE
}

/// Scriptable editor operations, e.g. `{"type": "paint", "params": {...}}`
#[derive(
    Debug, Clone,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq
)]
#[serde(tag = "type", content = "params")]
#[strum(serialize_all = "snake_case")]
pub enum EditCommand {
    /// Paint a class along a stroke
    #[serde(rename = "paint")]
    Paint {
        points: Vec<PixelPoint>,
        #[serde(default = "default_brush_size")]
        #[schemars(range(min = 1, max = 64))]
        size: u32,
        class: u8,
    },

    /// Erase user marks along a stroke
    #[serde(rename = "erase")]
    Erase {
        points: Vec<PixelPoint>,
        #[serde(default = "default_eraser_size")]
        #[schemars(range(min = 1, max = 64))]
        size: u32,
    },

    /// Clear the whole mask
    #[serde(rename = "reset")]
    Reset,

    /// Step back one history entry
    #[serde(rename = "undo")]
    Undo,

    /// Step forward one history entry
    #[serde(rename = "redo")]
    Redo,
}

impl EditCommand {
    /// Get the JSON schema for all commands
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(EditCommand)
    }

    /// Get a list of all available command names
    pub fn command_names() -> &'static [&'static str] {
        <Self as VariantNames>::VARIANTS
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Paint { .. } => "Paint a class with a square brush along a stroke",
            Self::Erase { .. } => "Remove user marks along a stroke, restoring background",
            Self::Reset => "Clear the mask and all user marks (undoable)",
            Self::Undo => "Restore the previous history entry",
            Self::Redo => "Re-apply the next history entry",
        }
    }

    /// Parameter name, description and whether it is required
    pub fn parameters_info(&self) -> Vec<(&'static str, &'static str, bool)> {
        match self {
            Self::Paint { .. } => vec![
                ("points", "Stroke positions in mask pixels", true),
                ("size", "Brush side length (default 8)", false),
                ("class", "Class index to paint", true),
            ],
            Self::Erase { .. } => vec![
                ("points", "Stroke positions in mask pixels", true),
                ("size", "Eraser side length (default 10)", false),
            ],
            Self::Reset | Self::Undo | Self::Redo => vec![],
        }
    }
}
