use std::{collections::BTreeMap, time::Duration};

use iris_common::{
    ActionInfo, ImageInfoSummary, IrisConfig, IrisUser, MaskShape, SegmentationBootstrap,
    UserConfigResponse,
};
use mask::{MaskBuffers, PredictMaskPayload, codec};
use reqwest::{
    Method, Response, StatusCode,
    header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::{
    backend::SegmentationBackend,
    base::{ApiPath, BackendUrl},
    error::{ClientError, Result},
};

const REQUESTED_WITH: &str = "x-requested-with";
const XML_HTTP_REQUEST: &str = "XMLHttpRequest";

#[derive(Debug, Clone)]
enum RequestBody {
    Empty,
    Json(Value),
    Bytes(Vec<u8>),
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct MessageResponse {
    #[serde(default)]
    message: String,
}

/// Builder for [`IrisClient`]
#[derive(Debug, Clone)]
pub struct IrisClientBuilder {
    origin: String,
    custom_base: Option<String>,
    read_env: bool,
    connect_timeout: Option<Duration>,
}

impl IrisClientBuilder {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            custom_base: None,
            read_env: false,
            connect_timeout: None,
        }
    }

    /// Custom backend base tried before the origin
    pub fn custom_base(mut self, base: Option<String>) -> Self {
        self.custom_base = base;
        self
    }

    /// Fall back to `IRIS_BACKEND_URL` when no custom base is given
    pub fn from_env(mut self) -> Self {
        self.read_env = true;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<IrisClient> {
        let urls = match (&self.custom_base, self.read_env) {
            (Some(base), _) => BackendUrl::new(&self.origin)?.with_custom_base(Some(base))?,
            (None, true) => BackendUrl::from_env(&self.origin)?,
            (None, false) => BackendUrl::new(&self.origin)?,
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(REQUESTED_WITH),
            HeaderValue::from_static(XML_HTTP_REQUEST),
        );

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true);
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build().map_err(ClientError::Builder)?;

        info!(
            origin = %urls.origin(),
            custom = urls.custom().map(|url| url.as_str()).unwrap_or("none"),
            "IRIS client ready"
        );
        Ok(IrisClient { http, urls })
    }
}

/// Async REST client for the IRIS backend. Cloning shares the connection
/// pool and the session cookie.
#[derive(Debug, Clone)]
pub struct IrisClient {
    http: reqwest::Client,
    urls: BackendUrl,
}

impl IrisClient {
    pub fn builder(origin: impl Into<String>) -> IrisClientBuilder {
        IrisClientBuilder::new(origin)
    }

    pub fn urls(&self) -> &BackendUrl {
        &self.urls
    }

    // Users

    pub async fn current_user(&self) -> Result<IrisUser> {
        self.get_json(&ApiPath::new(["user", "get", "current"])).await
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let body = serde_json::to_value(Credentials { username, password })?;
        self.send(Method::POST, &ApiPath::new(["user", "login"]), RequestBody::Json(body))
            .await?;
        info!(username, "Logged in");
        Ok(())
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<()> {
        let body = serde_json::to_value(Credentials { username, password })?;
        self.send(Method::POST, &ApiPath::new(["user", "register"]), RequestBody::Json(body))
            .await?;
        info!(username, "Registered user");
        Ok(())
    }

    // Configuration

    pub async fn user_config(&self) -> Result<UserConfigResponse> {
        let response: UserConfigResponse = self
            .get_json(&ApiPath::new(["segmentation", "api", "user-config"]))
            .await?;
        Ok(response.resolve_bands())
    }

    /// Validates the band selection locally; an empty list never reaches
    /// the network.
    pub async fn save_user_config(&self, config: &IrisConfig) -> Result<String> {
        config
            .segmentation
            .ai_model
            .validate_for_save()
            .map_err(|e| ClientError::Validation(e.to_string()))?;
        let body = serde_json::to_value(config)?;
        let response = self
            .send(
                Method::POST,
                &ApiPath::new(["segmentation", "api", "user-config"]),
                RequestBody::Json(body),
            )
            .await?;
        let reply: MessageResponse = read_json(response).await?;
        Ok(reply.message)
    }

    // Segmentation

    /// Resolve the current (or requested) image from the segmentation page
    pub async fn bootstrap(&self, image_id: Option<&str>) -> Result<SegmentationBootstrap> {
        let mut path = ApiPath::new(["segmentation"]).with_trailing_slash();
        if let Some(image_id) = image_id {
            path = path.query("image_id", image_id);
        }
        let html = self.get_text(&path).await?;
        Ok(SegmentationBootstrap::from_html(&html)?)
    }

    pub async fn load_mask(&self, image_id: &str, shape: MaskShape) -> Result<Option<MaskBuffers>> {
        let path = ApiPath::new(["segmentation", "load_mask", image_id]);
        match self.get_bytes(&path).await {
            Ok(bytes) => {
                let buffers = codec::decode_for_shape(&bytes, shape);
                debug!(image_id, bytes = bytes.len(), found = buffers.is_some(), "Loaded mask");
                Ok(buffers)
            }
            Err(error) if error.is_not_found() => {
                debug!(image_id, "No saved mask");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    pub async fn save_mask(&self, image_id: &str, payload: Vec<u8>) -> Result<()> {
        let bytes = payload.len();
        self.send(
            Method::POST,
            &ApiPath::new(["segmentation", "save_mask", image_id]),
            RequestBody::Bytes(payload),
        )
        .await?;
        info!(image_id, bytes, "Saved mask");
        Ok(())
    }

    pub async fn predict_mask(&self, image_id: &str, payload: &PredictMaskPayload) -> Result<Vec<u8>> {
        let body = serde_json::to_value(payload)?;
        let response = self
            .send(
                Method::POST,
                &ApiPath::new(["segmentation", "predict_mask", image_id]),
                RequestBody::Json(body),
            )
            .await?;
        let bytes = read_bytes(response).await?;
        info!(image_id, pixels = payload.user_pixels.len(), bytes = bytes.len(), "Received prediction");
        Ok(bytes)
    }

    pub async fn next_image_id(&self, current: &str) -> Result<String> {
        self.neighbour_id("next_image", "next", current).await
    }

    pub async fn previous_image_id(&self, current: &str) -> Result<String> {
        self.neighbour_id("previous_image", "previous", current).await
    }

    /// The backend answers with a redirect to the neighbour's page; the id
    /// is read from the final URL.
    async fn neighbour_id(&self, endpoint: &str, label: &str, current: &str) -> Result<String> {
        let path = ApiPath::new(["segmentation", endpoint]).query("image_id", current);
        let response = self.send(Method::GET, &path, RequestBody::Empty).await?;
        response
            .url()
            .query_pairs()
            .find(|(key, _)| key == "image_id")
            .map(|(_, value)| value.into_owned())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ClientError::Protocol(format!("Unable to determine {label} image id from redirect"))
            })
    }

    // Images

    pub async fn image_info(&self, image_id: &str) -> Result<ImageInfoSummary> {
        self.get_json(&ApiPath::new(["image_info", image_id])).await
    }

    pub async fn metadata(&self, image_id: &str) -> Result<Map<String, Value>> {
        self.get_json(&ApiPath::new(["metadata", image_id]).query("safe_html", "true"))
            .await
    }

    /// Encoded bytes of one view of an image
    pub async fn image_view(&self, image_id: &str, view: &str) -> Result<Vec<u8>> {
        self.get_bytes(&ApiPath::new(["image", image_id, view])).await
    }

    pub async fn action_info(&self, image_id: &str, action_type: &str) -> Result<ActionInfo> {
        self.get_json(&ApiPath::new(["get_action_info", image_id, action_type]))
            .await
    }

    pub async fn update_action_info(&self, action_id: u64, changes: &Map<String, Value>) -> Result<()> {
        self.send(
            Method::POST,
            &ApiPath::new(["set_action_info".to_string(), action_id.to_string()]),
            RequestBody::Json(Value::Object(changes.clone())),
        )
        .await?;
        Ok(())
    }

    /// Rendered help page for a hotkey table
    pub async fn help(&self, hotkeys: &BTreeMap<String, String>) -> Result<String> {
        let response = self
            .send(
                Method::POST,
                &ApiPath::new(["help"]).with_trailing_slash(),
                RequestBody::Json(json!({ "hotkeys": hotkeys })),
            )
            .await?;
        read_text(response).await
    }

    // Plumbing

    async fn get_json<T: DeserializeOwned>(&self, path: &ApiPath) -> Result<T> {
        let response = self.send(Method::GET, path, RequestBody::Empty).await?;
        read_json(response).await
    }

    async fn get_text(&self, path: &ApiPath) -> Result<String> {
        let response = self.send(Method::GET, path, RequestBody::Empty).await?;
        read_text(response).await
    }

    async fn get_bytes(&self, path: &ApiPath) -> Result<Vec<u8>> {
        let response = self.send(Method::GET, path, RequestBody::Empty).await?;
        read_bytes(response).await
    }

    /// Try each candidate URL until one answers; HTTP error statuses are
    /// final, only transport failures move on to the next candidate.
    async fn send(&self, method: Method, path: &ApiPath, body: RequestBody) -> Result<Response> {
        let mut last_error = None;
        for url in self.urls.candidates(path)? {
            debug!(%method, %url, "Request");
            let request = self.http.request(method.clone(), url.clone());
            let request = match &body {
                RequestBody::Empty => request,
                RequestBody::Json(value) => request.json(value),
                RequestBody::Bytes(bytes) => request
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(bytes.clone()),
            };
            match request.send().await {
                Ok(response) => return check_status(response).await,
                Err(error) => {
                    warn!(%url, %error, "Backend unreachable");
                    last_error = Some(error);
                }
            }
        }
        match last_error {
            Some(error) => Err(ClientError::Transport(error)),
            None => Err(ClientError::Url("no backend URL configured".to_string())),
        }
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        message: status_message(status, text),
    })
}

/// Server text when there is any, else the canonical reason
fn status_message(status: StatusCode, text: String) -> String {
    if !text.trim().is_empty() {
        return text;
    }
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string())
}

async fn read_bytes(response: Response) -> Result<Vec<u8>> {
    Ok(response.bytes().await.map_err(ClientError::Transport)?.to_vec())
}

async fn read_text(response: Response) -> Result<String> {
    response.text().await.map_err(ClientError::Transport)
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = read_bytes(response).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl SegmentationBackend for IrisClient {
    async fn current_user(&self) -> Result<IrisUser> {
        IrisClient::current_user(self).await
    }

    async fn user_config(&self) -> Result<UserConfigResponse> {
        IrisClient::user_config(self).await
    }

    async fn save_user_config(&self, config: &IrisConfig) -> Result<String> {
        IrisClient::save_user_config(self, config).await
    }

    async fn load_mask(&self, image_id: &str, shape: MaskShape) -> Result<Option<MaskBuffers>> {
        IrisClient::load_mask(self, image_id, shape).await
    }

    async fn save_mask(&self, image_id: &str, payload: Vec<u8>) -> Result<()> {
        IrisClient::save_mask(self, image_id, payload).await
    }

    async fn predict_mask(&self, image_id: &str, payload: &PredictMaskPayload) -> Result<Vec<u8>> {
        IrisClient::predict_mask(self, image_id, payload).await
    }

    async fn next_image_id(&self, current: &str) -> Result<String> {
        IrisClient::next_image_id(self, current).await
    }

    async fn previous_image_id(&self, current: &str) -> Result<String> {
        IrisClient::previous_image_id(self, current).await
    }

    async fn image_info(&self, image_id: &str) -> Result<ImageInfoSummary> {
        IrisClient::image_info(self, image_id).await
    }

    async fn metadata(&self, image_id: &str) -> Result<Map<String, Value>> {
        IrisClient::metadata(self, image_id).await
    }
}
