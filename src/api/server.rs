use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::camera::{StreamError, StreamRegistry};
use crate::results::{AiResult, DetectedResult, ResultCache};

use super::mjpeg;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<StreamRegistry>,
    pub cache: Arc<ResultCache>,
}

#[derive(Deserialize)]
struct CameraUrl {
    url: String,
}

#[derive(Deserialize)]
struct CameraInput {
    camera_id: String,
}

#[derive(Serialize)]
struct CameraEntry {
    camera_id: String,
    stream_url: String,
}

#[derive(Serialize)]
struct DeviceDetectionResponse {
    camera_id: String,
    post_frame: String,
    detected_result: Vec<DetectedResult>,
}

#[derive(Serialize)]
struct AiResultResponse {
    time: f64,
    device_list: Vec<DeviceDetectionResponse>,
}

fn to_response(result: AiResult) -> AiResultResponse {
    AiResultResponse {
        time: result.time,
        device_list: result
            .device_list
            .into_iter()
            .map(|device| DeviceDetectionResponse {
                camera_id: device.camera_id,
                post_frame: BASE64.encode(&device.post_frame),
                detected_result: device.detected_result,
            })
            .collect(),
    }
}

fn empty_result() -> AiResultResponse {
    AiResultResponse {
        time: chrono::Utc::now().timestamp_millis() as f64 / 1_000.0,
        device_list: Vec::new(),
    }
}

pub async fn start_server(state: AppState, port: u16) -> Result<(), std::io::Error> {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/cameras", post(add_camera_handler).get(list_cameras_handler))
        .route("/cameras/health", get(camera_health_handler))
        .route("/cameras/{*url}", delete(remove_camera_handler))
        .route("/result", get(global_result_handler).post(camera_result_handler))
        .route("/stream/{id}", get(stream_handler))
        .with_state(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("starting HTTP server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().timestamp_millis() as f64 / 1_000.0,
        "streams": state.registry.stream_count(),
    }))
}

async fn camera_health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.camera_health())
}

async fn add_camera_handler(
    State(state): State<AppState>,
    Json(camera): Json<CameraUrl>,
) -> Response {
    match state.registry.add(&camera.url) {
        Ok(info) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "message": "Camera added successfully",
                "camera_id": info.camera_id,
                "stream_url": info.stream_url,
            })),
        )
            .into_response(),
        Err(e @ StreamError::Validation(_)) => {
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn remove_camera_handler(State(state): State<AppState>, Path(url): Path<String>) -> Response {
    match state.registry.remove(&url) {
        Ok(()) => {
            Json(serde_json::json!({ "message": "Camera removed successfully" })).into_response()
        }
        Err(e @ StreamError::NotFound(_)) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn list_cameras_handler(State(state): State<AppState>) -> impl IntoResponse {
    let cameras: HashMap<String, CameraEntry> = state
        .registry
        .list()
        .into_iter()
        .map(|(url, info)| {
            (
                url,
                CameraEntry {
                    camera_id: info.camera_id,
                    stream_url: info.stream_url,
                },
            )
        })
        .collect();

    Json(serde_json::json!({
        "count": cameras.len(),
        "cameras": cameras,
    }))
}

async fn global_result_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.cache.latest_global() {
        Some(result) => Json(to_response(result)),
        None => Json(empty_result()),
    }
}

async fn camera_result_handler(
    State(state): State<AppState>,
    Json(input): Json<CameraInput>,
) -> Response {
    if !state.registry.is_valid_camera_id(&input.camera_id) {
        return (
            StatusCode::NOT_FOUND,
            format!("Stream ID {} not found", input.camera_id),
        )
            .into_response();
    }

    match state.cache.latest_for(&input.camera_id) {
        Some(result) => Json(to_response(result)).into_response(),
        None => Json(empty_result()).into_response(),
    }
}

async fn stream_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if !state.registry.is_valid_stream_id(&id) {
        return (StatusCode::NOT_FOUND, "stream not found").into_response();
    }
    mjpeg::stream_response(Arc::clone(&state.registry), Arc::clone(&state.cache), id)
}
