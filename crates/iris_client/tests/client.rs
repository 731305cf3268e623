use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use iris_client::{
    ClientError, IrisClient, LoadOutcome, SegmentationWorkspace, Tool, WorkspaceCommand,
};
use iris_common::MaskShape;
use mask::{MaskBuffers, PixelPoint, PredictMaskPayload};
use serde_json::{Value, json};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct ServerState {
    masks: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    predictions: Arc<Mutex<Vec<Value>>>,
}

fn project_config() -> Value {
    json!({
        "name": "integration",
        "images": {"path": "images/{id}.tif", "shape": [4, 4]},
        "segmentation": {"mask_shape": [2, 2], "ai_model": {"bands": null}},
        "classes": [
            {"name": "Clear", "colour": [0, 0, 0, 0]},
            {"name": "Cloud", "colour": [255, 255, 0]},
            {"name": "Shadow", "colour": [0, 0, 255]}
        ]
    })
}

async fn require_xhr(request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get("x-requested-with")
        .and_then(|value| value.to_str().ok());
    if header != Some("XMLHttpRequest") {
        return (StatusCode::BAD_REQUEST, "missing X-Requested-With").into_response();
    }
    next.run(request).await
}

async fn load_mask(State(state): State<ServerState>, Path(id): Path<String>) -> Response {
    match id.as_str() {
        "garbled" => vec![1u8, 2, 3].into_response(),
        "locked" => (StatusCode::FORBIDDEN, "Login required").into_response(),
        "broken" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        _ => match state.masks.lock().unwrap().get(&id) {
            Some(bytes) => bytes.clone().into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        },
    }
}

async fn save_mask(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    request: Request,
) -> Response {
    let octet_stream = request
        .headers()
        .get(CONTENT_TYPE)
        .is_some_and(|value| value == "application/octet-stream");
    if !octet_stream {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }
    let Ok(body) = axum::body::to_bytes(request.into_body(), 1 << 20).await else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    state.masks.lock().unwrap().insert(id, body.to_vec());
    StatusCode::OK.into_response()
}

async fn predict_mask(State(state): State<ServerState>, Json(body): Json<Value>) -> Vec<u8> {
    state.predictions.lock().unwrap().push(body);
    vec![2, 2, 2, 2]
}

async fn next_image(Query(query): Query<HashMap<String, String>>) -> Redirect {
    let current = query.get("image_id").cloned().unwrap_or_default();
    Redirect::to(&format!("/segmentation/?image_id={current}-next"))
}

async fn previous_image() -> Redirect {
    Redirect::to("/segmentation/")
}

async fn segmentation_page(Query(query): Query<HashMap<String, String>>) -> Html<String> {
    let id = query.get("image_id").cloned().unwrap_or_else(|| "first".to_string());
    Html(format!(
        "<script>const vars = {{'image_id': \"{id}\", 'image_location': [10.5, 20.0]}};</script>"
    ))
}

async fn image_info(Path(id): Path<String>) -> Json<Value> {
    Json(json!({"id": id, "segmentation": {"count": 2, "current_user_score": 0.75}}))
}

async fn metadata(Path(id): Path<String>) -> Json<Value> {
    Json(json!({"location": [1.0, 2.0], "name": id}))
}

async fn current_user() -> Json<Value> {
    Json(json!({"id": 7, "name": "ada", "admin": true, "config": project_config()}))
}

async fn user_config() -> Json<Value> {
    Json(json!({"config": project_config(), "all_bands": ["B1", "B2", "B3"], "is_admin": false}))
}

async fn save_user_config(Json(body): Json<Value>) -> Json<Value> {
    let bands = body["segmentation"]["ai_model"]["bands"]
        .as_array()
        .map_or(0, Vec::len);
    Json(json!({"message": format!("Saved {bands} bands")}))
}

async fn help(Json(body): Json<Value>) -> Html<String> {
    let rows = body["hotkeys"].as_object().map_or(0, |table| table.len());
    Html(format!("<table>{rows}</table>"))
}

async fn login(Json(body): Json<Value>) -> StatusCode {
    if body["password"] == "secret" {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    }
}

async fn spawn_server() -> (String, ServerState) {
    let state = ServerState::default();
    let app = Router::new()
        .route("/segmentation/", get(segmentation_page))
        .route("/segmentation/load_mask/{id}", get(load_mask))
        .route("/segmentation/save_mask/{id}", post(save_mask))
        .route("/segmentation/predict_mask/{id}", post(predict_mask))
        .route("/segmentation/next_image", get(next_image))
        .route("/segmentation/previous_image", get(previous_image))
        .route("/segmentation/api/user-config", get(user_config).post(save_user_config))
        .route("/image_info/{id}", get(image_info))
        .route("/metadata/{id}", get(metadata))
        .route("/user/get/current", get(current_user))
        .route("/user/login", post(login))
        .route("/help/", post(help))
        .layer(middleware::from_fn(require_xhr))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

fn shape() -> MaskShape {
    MaskShape::new(2, 2).unwrap()
}

#[tokio::test]
async fn test_missing_mask_is_none() {
    let (origin, _) = spawn_server().await;
    let client = IrisClient::builder(origin).build().unwrap();
    assert!(client.load_mask("unknown", shape()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_garbled_mask_is_none() {
    let (origin, _) = spawn_server().await;
    let client = IrisClient::builder(origin).build().unwrap();
    assert!(client.load_mask("garbled", shape()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_save_then_load_mask() {
    let (origin, state) = spawn_server().await;
    let client = IrisClient::builder(origin).build().unwrap();
    let payload = vec![254, 1, 0, 0, 2, 1, 0, 0, 1, 254];

    client.save_mask("tile-1", payload.clone()).await.unwrap();
    assert_eq!(state.masks.lock().unwrap()["tile-1"], payload);

    let buffers = client.load_mask("tile-1", shape()).await.unwrap().unwrap();
    assert_eq!(buffers, MaskBuffers::new(vec![1, 0, 0, 2], vec![1, 0, 0, 1]).unwrap());
}

#[tokio::test]
async fn test_status_errors() {
    let (origin, _) = spawn_server().await;
    let client = IrisClient::builder(origin).build().unwrap();

    let locked = client.load_mask("locked", shape()).await.unwrap_err();
    assert!(locked.is_auth_required());
    assert_eq!(locked.to_string(), "HTTP 403: Login required");

    let broken = client.load_mask("broken", shape()).await.unwrap_err();
    assert_eq!(broken.status(), Some(500));
    assert_eq!(broken.to_string(), "HTTP 500: Internal Server Error");

    let login = client.login("ada", "wrong").await.unwrap_err();
    assert_eq!(login.status(), Some(401));
    client.login("ada", "secret").await.unwrap();
}

#[tokio::test]
async fn test_predict_sends_user_pixels() {
    let (origin, state) = spawn_server().await;
    let client = IrisClient::builder(origin).build().unwrap();
    let buffers = MaskBuffers::new(vec![1, 0, 0, 2], vec![1, 0, 0, 1]).unwrap();
    let payload = PredictMaskPayload::from_buffers(&buffers);

    let prediction = client.predict_mask("tile-1", &payload).await.unwrap();
    assert_eq!(prediction, vec![2, 2, 2, 2]);

    let sent = state.predictions.lock().unwrap()[0].clone();
    assert_eq!(sent["user_pixels"], json!([0, 3]));
    assert_eq!(sent["user_labels"], json!([1, 2]));
}

#[tokio::test]
async fn test_neighbours_follow_redirects() {
    let (origin, _) = spawn_server().await;
    let client = IrisClient::builder(origin).build().unwrap();
    assert_eq!(client.next_image_id("tile-1").await.unwrap(), "tile-1-next");

    let error = client.previous_image_id("tile-1").await.unwrap_err();
    assert!(matches!(error, ClientError::Protocol(_)));
}

#[tokio::test]
async fn test_bootstrap_page() {
    let (origin, _) = spawn_server().await;
    let client = IrisClient::builder(origin).build().unwrap();
    let bootstrap = client.bootstrap(None).await.unwrap();
    assert_eq!(bootstrap.image_id, "first");
    assert_eq!(bootstrap.image_location, [10.5, 20.0]);
    assert_eq!(client.bootstrap(Some("tile 9")).await.unwrap().image_id, "tile 9");
}

#[tokio::test]
async fn test_user_config_resolves_bands() {
    let (origin, _) = spawn_server().await;
    let client = IrisClient::builder(origin).build().unwrap();
    let response = client.user_config().await.unwrap();
    assert_eq!(response.config.segmentation.ai_model.bands(), &["B1", "B2", "B3"]);
    assert!(response.excluded_bands().is_empty());

    let mut config = response.config;
    config.segmentation.ai_model.exclude_bands(&["B3".to_string()]);
    assert_eq!(client.save_user_config(&config).await.unwrap(), "Saved 2 bands");

    config.segmentation.ai_model.bands = Some(vec![]);
    let error = client.save_user_config(&config).await.unwrap_err();
    assert!(matches!(error, ClientError::Validation(_)));
}

#[tokio::test]
async fn test_help_posts_hotkeys() {
    let (origin, _) = spawn_server().await;
    let client = IrisClient::builder(origin).build().unwrap();
    let html = client.help(&WorkspaceCommand::hotkey_table()).await.unwrap();
    assert_eq!(html, "<table>25</table>");
}

#[tokio::test]
async fn test_unreachable_custom_base_falls_back_to_origin() {
    let (origin, _) = spawn_server().await;
    let client = IrisClient::builder(origin)
        .custom_base(Some("http://127.0.0.1:1".to_string()))
        .build()
        .unwrap();
    assert!(client.urls().has_custom_backend());
    let user = client.current_user().await.unwrap();
    assert_eq!(user.name, "ada");
}

#[tokio::test]
async fn test_workspace_round_trip() {
    let (origin, state) = spawn_server().await;
    let client = IrisClient::builder(origin).build().unwrap();
    let user = client.current_user().await.unwrap();
    let config = user.config.clone().unwrap();
    let mut workspace = SegmentationWorkspace::new(config).with_user(user);

    assert_eq!(workspace.load_image(&client, "tile-1").await, LoadOutcome::Applied);
    assert_eq!(workspace.image_info().unwrap().score_label(), "0.75");
    assert!(workspace.metadata().is_some());

    workspace.handle_command(WorkspaceCommand::ToolDraw);
    assert_eq!(workspace.tool(), Tool::Draw);
    workspace.select_class(1);
    workspace.stroke_at(PixelPoint::new(0, 0));
    workspace.end_stroke();

    assert_eq!(workspace.next_image(&client).await.unwrap(), LoadOutcome::Applied);
    assert_eq!(workspace.image_id(), Some("tile-1-next"));
    assert_eq!(
        state.masks.lock().unwrap()["tile-1"],
        vec![254, 1, 1, 1, 1, 1, 1, 1, 1, 254]
    );
}
