use iris_common::IrisError;
use mask::MaskError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The request never produced a response on any candidate URL
    #[error("Unable to reach server: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Rejected locally, no request was sent
    #[error("{0}")]
    Validation(String),

    #[error("Invalid backend URL: {0}")]
    Url(String),

    #[error("Failed to build HTTP client: {0}")]
    Builder(#[source] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("No image loaded")]
    NoImage,

    #[error("A save is already in progress for image {0}")]
    SaveInProgress(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Mask(#[from] MaskError),

    #[error(transparent)]
    Common(#[from] IrisError),

    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The session is missing or expired and the user must log in
    pub fn is_auth_required(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
