use std::future::Future;

use iris_common::{ImageInfoSummary, IrisConfig, IrisUser, MaskShape, UserConfigResponse};
use mask::{MaskBuffers, PredictMaskPayload};
use serde_json::{Map, Value};

use crate::error::Result;

/// The backend operations the segmentation workspace depends on.
///
/// [`crate::IrisClient`] implements this over HTTP; tests swap in an
/// in-memory backend.
pub trait SegmentationBackend: Send + Sync {
    fn current_user(&self) -> impl Future<Output = Result<IrisUser>> + Send;

    fn user_config(&self) -> impl Future<Output = Result<UserConfigResponse>> + Send;

    /// Persist the user's configuration; returns the server's message
    fn save_user_config(&self, config: &IrisConfig) -> impl Future<Output = Result<String>> + Send;

    /// Saved mask of an image, `None` when there is none or it is unusable
    fn load_mask(
        &self,
        image_id: &str,
        shape: MaskShape,
    ) -> impl Future<Output = Result<Option<MaskBuffers>>> + Send;

    /// Store an encoded mask envelope
    fn save_mask(&self, image_id: &str, payload: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    /// Raw single-buffer prediction for the image
    fn predict_mask(
        &self,
        image_id: &str,
        payload: &PredictMaskPayload,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    fn next_image_id(&self, current: &str) -> impl Future<Output = Result<String>> + Send;

    fn previous_image_id(&self, current: &str) -> impl Future<Output = Result<String>> + Send;

    fn image_info(&self, image_id: &str) -> impl Future<Output = Result<ImageInfoSummary>> + Send;

    fn metadata(&self, image_id: &str) -> impl Future<Output = Result<Map<String, Value>>> + Send;
}
