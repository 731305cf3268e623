//! Pan and zoom of the image/mask canvas.
//!
//! Screen space is the viewer element; local space is the unscaled view of
//! the same size. `screen = offset + local * scale`.

use iris_common::{MaskArea, MaskShape};
use serde::{Deserialize, Serialize};

pub const MIN_SCALE: f64 = 0.5;
pub const MAX_SCALE: f64 = 8.0;

/// Wheel scrolling down zooms out by this factor
pub const ZOOM_OUT_FACTOR: f64 = 0.9;
/// Wheel scrolling up zooms in by this factor
pub const ZOOM_IN_FACTOR: f64 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    #[serde(skip)]
    last_drag_pos: Option<(f64, f64)>,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            last_drag_pos: None,
        }
    }
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zoom about the pointer so the point under it stays put
    pub fn wheel(&mut self, delta_y: f64, pointer_x: f64, pointer_y: f64) {
        let factor = if delta_y > 0.0 {
            ZOOM_OUT_FACTOR
        } else {
            ZOOM_IN_FACTOR
        };
        let scale = (self.scale * factor).clamp(MIN_SCALE, MAX_SCALE);
        let change = scale / self.scale;
        self.offset_x = pointer_x - (pointer_x - self.offset_x) * change;
        self.offset_y = pointer_y - (pointer_y - self.offset_y) * change;
        self.scale = scale;
    }

    pub fn is_dragging(&self) -> bool {
        self.last_drag_pos.is_some()
    }

    pub fn start_drag(&mut self, x: f64, y: f64) {
        self.last_drag_pos = Some((x, y));
    }

    /// Move by the pointer delta since the previous drag position
    pub fn update_drag(&mut self, x: f64, y: f64) -> Option<(f64, f64)> {
        let (last_x, last_y) = self.last_drag_pos?;
        let delta = (x - last_x, y - last_y);
        self.offset_x += delta.0;
        self.offset_y += delta.1;
        self.last_drag_pos = Some((x, y));
        Some(delta)
    }

    pub fn end_drag(&mut self) {
        self.last_drag_pos = None;
    }

    /// Back to scale 1 with no offset (double click)
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Screen point to unscaled view coordinates
    pub fn screen_to_local(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.offset_x) / self.scale, (y - self.offset_y) / self.scale)
    }

    /// Screen point to a mask pixel.
    ///
    /// The image (`image_shape` pixels) is stretched over a view of
    /// `view_size`; the mask covers `area` of the image. Points outside the
    /// area map to `None`.
    pub fn screen_to_mask(
        &self,
        x: f64,
        y: f64,
        view_size: (f64, f64),
        image_shape: MaskShape,
        area: MaskArea,
        mask_shape: MaskShape,
    ) -> Option<(u32, u32)> {
        let (view_w, view_h) = view_size;
        if view_w <= 0.0 || view_h <= 0.0 || area.width() == 0 || area.height() == 0 {
            return None;
        }
        let (local_x, local_y) = self.screen_to_local(x, y);
        let image_x = local_x * image_shape.width() as f64 / view_w;
        let image_y = local_y * image_shape.height() as f64 / view_h;
        if !area.contains(image_x, image_y) {
            return None;
        }

        let mask_x = (image_x - area.0 as f64) * mask_shape.width() as f64 / area.width() as f64;
        let mask_y = (image_y - area.1 as f64) * mask_shape.height() as f64 / area.height() as f64;
        Some((
            (mask_x.floor() as u32).min(mask_shape.width() - 1),
            (mask_y.floor() as u32).min(mask_shape.height() - 1),
        ))
    }
}
