use iris_common::MaskShape;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{DEFAULT_BRUSH_SIZE, DEFAULT_ERASER_SIZE, PixelPoint, footprint, trace};
use crate::traits::MaskEdit;

/// Paint `class` with a square brush along a stroke, marking the pixels as
/// user-edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BrushStroke {
    pub points: Vec<PixelPoint>,
    pub size: u32,
    pub class: u8,
}

impl BrushStroke {
    pub fn new(points: Vec<PixelPoint>, class: u8) -> Self {
        Self {
            points,
            size: DEFAULT_BRUSH_SIZE,
            class,
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }
}

impl MaskEdit for BrushStroke {
    fn apply(&self, shape: MaskShape, mask: &mut [u8], user: &mut [u8]) -> bool {
        let mut changed = false;
        for point in trace(&self.points) {
            for index in footprint(shape, point, self.size) {
                if mask[index] != self.class || user[index] != 1 {
                    mask[index] = self.class;
                    user[index] = 1;
                    changed = true;
                }
            }
        }
        changed
    }

    fn label(&self) -> &'static str {
        "brush"
    }
}

/// Remove user marks along a stroke; erased pixels fall back to class 0.
/// Pixels the user never touched are left alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EraserStroke {
    pub points: Vec<PixelPoint>,
    pub size: u32,
}

impl EraserStroke {
    pub fn new(points: Vec<PixelPoint>) -> Self {
        Self {
            points,
            size: DEFAULT_ERASER_SIZE,
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }
}

impl MaskEdit for EraserStroke {
    fn apply(&self, shape: MaskShape, mask: &mut [u8], user: &mut [u8]) -> bool {
        let mut changed = false;
        for point in trace(&self.points) {
            for index in footprint(shape, point, self.size) {
                if user[index] != 0 {
                    user[index] = 0;
                    mask[index] = 0;
                    changed = true;
                }
            }
        }
        changed
    }

    fn label(&self) -> &'static str {
        "eraser"
    }
}
