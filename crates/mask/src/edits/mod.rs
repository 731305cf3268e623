pub mod brush;
pub mod prediction;

pub use brush::{BrushStroke, EraserStroke};
pub use prediction::{PredictionMerge, ResetMask};

use std::{fmt, str::FromStr};

use iris_common::MaskShape;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default side length of the paint brush, in mask pixels
pub const DEFAULT_BRUSH_SIZE: u32 = 8;

/// Default side length of the eraser, in mask pixels
pub const DEFAULT_ERASER_SIZE: u32 = 10;

/// A pixel position in mask coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct PixelPoint {
    pub x: u32,
    pub y: u32,
}

impl PixelPoint {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for PixelPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

impl FromStr for PixelPoint {
    type Err = String;

    /// Parses `"x,y"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| format!("expected 'x,y', got '{s}'"))?;
        let x = x.trim().parse().map_err(|_| format!("invalid x in '{s}'"))?;
        let y = y.trim().parse().map_err(|_| format!("invalid y in '{s}'"))?;
        Ok(Self { x, y })
    }
}

/// Every integer point on the polyline through `points`, so a fast drag
/// leaves no gaps between sampled positions.
pub(crate) fn trace(points: &[PixelPoint]) -> Vec<PixelPoint> {
    let Some(first) = points.first() else {
        return Vec::new();
    };
    let mut traced = vec![*first];
    for pair in points.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let dx = to.x as i64 - from.x as i64;
        let dy = to.y as i64 - from.y as i64;
        let steps = dx.abs().max(dy.abs());
        for step in 1..=steps {
            let x = from.x as i64 + (dx * step + steps / 2 * dx.signum()) / steps;
            let y = from.y as i64 + (dy * step + steps / 2 * dy.signum()) / steps;
            traced.push(PixelPoint::new(x as u32, y as u32));
        }
    }
    traced
}

/// Flat indices of the `size`x`size` square centred on `centre`, clipped to
/// the mask.
pub(crate) fn footprint(
    shape: MaskShape,
    centre: PixelPoint,
    size: u32,
) -> impl Iterator<Item = usize> {
    let size = size.max(1) as i64;
    let half = size / 2;
    let x0 = (centre.x as i64 - half).max(0);
    let y0 = (centre.y as i64 - half).max(0);
    let x1 = (centre.x as i64 - half + size).min(shape.width() as i64);
    let y1 = (centre.y as i64 - half + size).min(shape.height() as i64);
    let width = shape.width() as usize;

    (y0..y1).flat_map(move |y| (x0..x1).map(move |x| y as usize * width + x as usize))
}
