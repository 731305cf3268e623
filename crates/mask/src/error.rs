use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaskError {
    #[error("Mask and user buffers differ in length: {mask} vs {user}")]
    LengthMismatch { mask: usize, user: usize },

    #[error("Mask buffers must not be empty")]
    Empty,

    #[error("Mask has {actual} pixels but the configured shape needs {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Prediction has {actual} pixels but the mask has {expected}")]
    PredictionLength { expected: usize, actual: usize },

    #[error("Failed to encode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(#[from] iris_common::IrisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MaskError>;
