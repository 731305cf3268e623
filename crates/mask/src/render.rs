//! Overlay rendering and canvas filter settings.

use std::path::Path;

use image::{Rgba, RgbaImage};
use iris_common::{ClassDef, MaskShape};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use tracing::debug;

use crate::{
    error::{MaskError, Result},
    types::MaskBuffers,
};

const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

/// Colour used to flag user marks the model disagrees with
pub const ERROR_COLOUR: [u8; 4] = [255, 0, 0, 255];

/// Class index to RGBA lookup built from the class table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassPalette {
    colours: Vec<[u8; 4]>,
    user_colours: Vec<[u8; 4]>,
}

impl ClassPalette {
    pub fn from_classes(classes: &[ClassDef]) -> Self {
        let colours: Vec<[u8; 4]> = classes.iter().map(|class| class.colour.rgba()).collect();
        let user_colours = classes
            .iter()
            .zip(&colours)
            .map(|(class, colour)| class.user_colour.as_ref().map_or(*colour, |c| c.rgba()))
            .collect();
        Self {
            colours,
            user_colours,
        }
    }

    pub fn len(&self) -> usize {
        self.colours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colours.is_empty()
    }

    /// Colour of a class; unknown indices are transparent
    pub fn colour(&self, class: u8) -> [u8; 4] {
        self.colours.get(class as usize).copied().unwrap_or(TRANSPARENT)
    }

    /// Colour for user-marked pixels of a class
    pub fn user_colour(&self, class: u8) -> [u8; 4] {
        self.user_colours.get(class as usize).copied().unwrap_or(TRANSPARENT)
    }
}

/// What the mask canvas shows
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, IntoStaticStr
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DisplayMode {
    /// Every pixel in its class colour
    #[default]
    Final,
    /// Only the pixels the annotator marked
    User,
    /// User marks that differ from the last prediction
    Errors,
}

/// Paint the mask as an RGBA image of the mask's own size.
///
/// `reference` is the last model prediction; without it the errors view is
/// empty.
pub fn render_overlay(
    buffers: &MaskBuffers,
    shape: MaskShape,
    palette: &ClassPalette,
    mode: DisplayMode,
    reference: Option<&[u8]>,
) -> Result<RgbaImage> {
    if buffers.len() != shape.len() {
        return Err(MaskError::ShapeMismatch {
            expected: shape.len(),
            actual: buffers.len(),
        });
    }
    let reference = reference.filter(|r| r.len() == buffers.len());
    let mask = buffers.mask();
    let width = shape.width() as usize;

    let image = RgbaImage::from_fn(shape.width(), shape.height(), |x, y| {
        let index = y as usize * width + x as usize;
        let class = mask[index];
        let marked = buffers.is_user_marked(index);
        let colour = match mode {
            DisplayMode::Final => palette.colour(class),
            DisplayMode::User if marked => palette.user_colour(class),
            DisplayMode::User => TRANSPARENT,
            DisplayMode::Errors => match reference {
                Some(reference) if marked && reference[index] != class => ERROR_COLOUR,
                _ => TRANSPARENT,
            },
        };
        Rgba(colour)
    });
    debug!(mode = %mode, width = shape.width(), height = shape.height(), "Rendered overlay");
    Ok(image)
}

/// Write an overlay as PNG
pub fn save_overlay_png(image: &RgbaImage, path: impl AsRef<Path>) -> Result<()> {
    image.save_with_format(path.as_ref(), image::ImageFormat::Png)?;
    Ok(())
}

pub const MIN_BRIGHTNESS: u32 = 10;
pub const MAX_BRIGHTNESS: u32 = 300;
pub const MAX_SATURATION: u32 = 300;

/// Image filters applied under the mask (percentages)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ViewFilters {
    pub contrast: bool,
    pub invert: bool,
    brightness: u32,
    saturation: u32,
}

impl Default for ViewFilters {
    fn default() -> Self {
        Self {
            contrast: false,
            invert: false,
            brightness: 100,
            saturation: 100,
        }
    }
}

impl ViewFilters {
    pub fn brightness(&self) -> u32 {
        self.brightness
    }

    pub fn saturation(&self) -> u32 {
        self.saturation
    }

    pub fn set_brightness(&mut self, value: i64) {
        self.brightness = value.clamp(MIN_BRIGHTNESS as i64, MAX_BRIGHTNESS as i64) as u32;
    }

    pub fn set_saturation(&mut self, value: i64) {
        self.saturation = value.clamp(0, MAX_SATURATION as i64) as u32;
    }

    pub fn adjust_brightness(&mut self, delta: i64) {
        self.set_brightness(self.brightness as i64 + delta);
    }

    pub fn adjust_saturation(&mut self, delta: i64) {
        self.set_saturation(self.saturation as i64 + delta);
    }

    pub fn toggle_contrast(&mut self) {
        self.contrast = !self.contrast;
    }

    pub fn toggle_invert(&mut self) {
        self.invert = !self.invert;
    }

    /// CSS `filter` value for the image layers
    pub fn css_filter(&self) -> String {
        let mut filter = format!(
            "brightness({}%) saturate({}%)",
            self.brightness, self.saturation
        );
        if self.contrast {
            filter.push_str(" contrast(150%)");
        }
        if self.invert {
            filter.push_str(" invert(100%)");
        }
        filter
    }
}
