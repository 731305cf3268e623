//! # IRIS Common - Shared Types and Utilities
//!
//! Shared data structures for the IRIS segmentation toolkit: the project and
//! user configuration model, the user / image DTOs returned by the backend,
//! and the mask geometry types every other crate agrees on.
//!
//! ## Example
//!
//! ```rust
//! use iris_common::{MaskShape, MaskArea};
//!
//! let shape = MaskShape::new(512, 256).unwrap();
//! assert_eq!(shape.len(), 512 * 256);
//!
//! let area = MaskArea::full(shape);
//! assert_eq!(area.width(), 512);
//! ```

pub mod config;
pub mod user;

use serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use thiserror::Error;

// Re-exports for convenience
pub use chrono::{DateTime, Utc};
pub use config::{
    AiModelConfig, ClassColour, ClassDef, ImagePath, ImagesConfig, IrisConfig, MaskEncoding,
    MeshgridCells, PathSetting, ScoreKind, SegmentationConfig, UserConfigResponse, ViewConfig,
    NEED_ONE_BAND_MESSAGE,
};
pub use user::{
    ActionInfo, ImageInfoSummary, IrisUser, SegmentationBootstrap, SegmentationStats, TaskScore,
};

/// Result type for IRIS operations
pub type Result<T> = std::result::Result<T, IrisError>;

/// Standard error type for configuration and model validation
#[derive(Error, Debug)]
pub enum IrisError {
    #[error("Invalid mask shape: {width}x{height}")]
    InvalidMaskShape { width: u32, height: u32 },

    #[error("Invalid mask area: [{x0}, {y0}, {x1}, {y1}]")]
    InvalidMaskArea { x0: u32, y0: u32, x1: u32, y1: u32 },

    #[error("{0}")]
    Validation(String),

    #[error("Invalid value: {message}")]
    InvalidValue { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Dimensions of a segmentation mask, serialised as `[width, height]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct MaskShape(pub u32, pub u32);

impl MaskShape {
    /// Create a new shape; both sides must be strictly positive
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let shape = Self(width, height);
        shape.validate()?;
        Ok(shape)
    }

    pub fn width(&self) -> u32 {
        self.0
    }

    pub fn height(&self) -> u32 {
        self.1
    }

    /// Number of pixels covered by the mask
    pub fn len(&self) -> usize {
        self.0 as usize * self.1 as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat buffer index of the pixel at `(x, y)`, if inside the mask
    pub fn index_of(&self, x: u32, y: u32) -> Option<usize> {
        if x < self.0 && y < self.1 {
            Some(y as usize * self.0 as usize + x as usize)
        } else {
            None
        }
    }

    /// Pixel coordinates of a flat buffer index
    pub fn coords_of(&self, index: usize) -> Option<(u32, u32)> {
        if index < self.len() {
            let width = self.0 as usize;
            Some(((index % width) as u32, (index / width) as u32))
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.0 == 0 || self.1 == 0 {
            return Err(IrisError::InvalidMaskShape {
                width: self.0,
                height: self.1,
            });
        }
        Ok(())
    }
}

/// Region of the image covered by the mask: `[x0, y0, x1, y1]` in image pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MaskArea(pub u32, pub u32, pub u32, pub u32);

impl MaskArea {
    /// Area spanning a whole image of the given shape
    pub fn full(shape: MaskShape) -> Self {
        Self(0, 0, shape.width(), shape.height())
    }

    pub fn width(&self) -> u32 {
        self.2.saturating_sub(self.0)
    }

    pub fn height(&self) -> u32 {
        self.3.saturating_sub(self.1)
    }

    /// Check if an image-space point falls inside the area
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.0 as f64 && x < self.2 as f64 && y >= self.1 as f64 && y < self.3 as f64
    }

    pub fn validate(&self) -> Result<()> {
        if self.2 <= self.0 || self.3 <= self.1 {
            return Err(IrisError::InvalidMaskArea {
                x0: self.0,
                y0: self.1,
                x1: self.2,
                y1: self.3,
            });
        }
        Ok(())
    }
}
