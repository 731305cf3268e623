use iris_common::MaskShape;
use serde::{Deserialize, Serialize};

use crate::traits::MaskEdit;

/// Copy a model prediction into every pixel the user has not marked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionMerge {
    pub prediction: Vec<u8>,
}

impl PredictionMerge {
    pub fn new(prediction: Vec<u8>) -> Self {
        Self { prediction }
    }
}

impl MaskEdit for PredictionMerge {
    fn apply(&self, _shape: MaskShape, mask: &mut [u8], user: &mut [u8]) -> bool {
        if self.prediction.len() != mask.len() {
            return false;
        }
        let mut changed = false;
        for ((pixel, &flag), &predicted) in mask.iter_mut().zip(user.iter()).zip(&self.prediction) {
            if flag == 0 && *pixel != predicted {
                *pixel = predicted;
                changed = true;
            }
        }
        changed
    }

    fn label(&self) -> &'static str {
        "prediction"
    }
}

/// Zero both buffers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetMask;

impl MaskEdit for ResetMask {
    fn apply(&self, _shape: MaskShape, mask: &mut [u8], user: &mut [u8]) -> bool {
        let changed = mask.iter().chain(user.iter()).any(|&b| b != 0);
        mask.fill(0);
        user.fill(0);
        changed
    }

    fn label(&self) -> &'static str {
        "reset"
    }
}
