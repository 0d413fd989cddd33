use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::camera::StreamRegistry;
use crate::results::ResultCache;

/// Pacing ceiling, roughly 30 fps; the stream never outruns capture.
const FRAME_INTERVAL: Duration = Duration::from_millis(33);
/// Backoff while no frame is buffered yet.
const IDLE_WAIT: Duration = Duration::from_millis(100);

const BOUNDARY: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

/// Live multipart JPEG sequence for one stream: annotated frames when
/// available, raw frames otherwise. Ends when the camera is deregistered.
pub fn stream_response(
    registry: Arc<StreamRegistry>,
    cache: Arc<ResultCache>,
    stream_id: String,
) -> Response {
    let frames = async_stream::stream! {
        let mut ticker = tokio::time::interval(FRAME_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !registry.is_valid_stream_id(&stream_id) {
                break;
            }

            let jpeg = cache
                .annotated_frame(&stream_id)
                .or_else(|| cache.raw_frame(&stream_id));
            let Some(jpeg) = jpeg else {
                tokio::time::sleep(IDLE_WAIT).await;
                continue;
            };

            let mut chunk = Vec::with_capacity(BOUNDARY.len() + jpeg.len() + 2);
            chunk.extend_from_slice(BOUNDARY);
            chunk.extend_from_slice(&jpeg);
            chunk.extend_from_slice(b"\r\n");
            yield Ok::<_, Infallible>(Bytes::from(chunk));
        }
    };

    match Response::builder()
        .header(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )
        .body(Body::from_stream(frames))
    {
        Ok(response) => response,
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "stream setup failed").into_response(),
    }
}
