use serde::{Deserialize, Serialize};

use crate::error::{MaskError, Result};

/// A mask buffer and its user-edit buffer, always of equal, positive length.
///
/// Cloning produces an independent copy; history snapshots rely on that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskBuffers {
    mask: Vec<u8>,
    user: Vec<u8>,
}

impl MaskBuffers {
    /// Pair a class-index buffer with its user-edit flags
    pub fn new(mask: Vec<u8>, user: Vec<u8>) -> Result<Self> {
        if mask.len() != user.len() {
            return Err(MaskError::LengthMismatch {
                mask: mask.len(),
                user: user.len(),
            });
        }
        if mask.is_empty() {
            return Err(MaskError::Empty);
        }
        Ok(Self { mask, user })
    }

    /// Zero-filled buffers, used when an image has no saved mask yet
    pub fn zeroed(len: usize) -> Result<Self> {
        Self::new(vec![0; len], vec![0; len])
    }

    /// Zero-filled buffers of the same length
    pub fn zeroed_like(&self) -> Self {
        Self {
            mask: vec![0; self.len()],
            user: vec![0; self.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    pub fn mask(&self) -> &[u8] {
        &self.mask
    }

    pub fn user(&self) -> &[u8] {
        &self.user
    }

    /// Whether the annotator touched the pixel at `index`
    pub fn is_user_marked(&self, index: usize) -> bool {
        self.user.get(index).is_some_and(|&flag| flag != 0)
    }

    /// Mutable views of both buffers; slices keep the lengths fixed
    pub fn parts_mut(&mut self) -> (&mut [u8], &mut [u8]) {
        (&mut self.mask, &mut self.user)
    }

    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>) {
        (self.mask, self.user)
    }
}

/// Body of `POST /segmentation/predict_mask/{id}`: the user-marked pixels
/// (flat indices) and the classes drawn there.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PredictMaskPayload {
    pub user_pixels: Vec<u32>,
    pub user_labels: Vec<u8>,
}

impl PredictMaskPayload {
    pub fn from_buffers(buffers: &MaskBuffers) -> Self {
        let (user_pixels, user_labels) = buffers
            .user()
            .iter()
            .zip(buffers.mask())
            .enumerate()
            .filter(|(_, (flag, _))| **flag != 0)
            .map(|(index, (_, class))| (index as u32, *class))
            .unzip();
        Self {
            user_pixels,
            user_labels,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user_pixels.is_empty()
    }
}
