use std::time::Duration;

use opencv::core::{Mat, Vector};
use opencv::imgcodecs;
use opencv::prelude::*;
use opencv::videoio;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("frame read timed out")]
    Timeout,
}

/// Exclusive capture handle for one camera URL. Lives on its worker task;
/// blocking reads run on the blocking pool.
pub struct FrameGrabber {
    url: String,
    capture: Option<videoio::VideoCapture>,
}

impl FrameGrabber {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            capture: None,
        }
    }

    /// Open the source and perform one confirming read before marking the
    /// stream usable. Never panics; failures return false.
    pub fn initialize(&mut self) -> bool {
        self.capture = None;

        let mut capture = match videoio::VideoCapture::from_file(&self.url, videoio::CAP_ANY) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(url = %self.url, error = %e, "failed to create capture");
                return false;
            }
        };

        match capture.is_opened() {
            Ok(true) => {}
            _ => {
                tracing::error!(url = %self.url, "failed to open video stream");
                return false;
            }
        }

        let mut probe = Mat::default();
        match capture.read(&mut probe) {
            Ok(true) => {
                tracing::info!(url = %self.url, "stream initialized");
                self.capture = Some(capture);
                true
            }
            _ => {
                tracing::error!(url = %self.url, "could not read first frame");
                false
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.capture
            .as_ref()
            .is_some_and(|c| c.is_opened().unwrap_or(false))
    }

    /// Blocking single-frame read.
    pub fn read(&mut self) -> Result<Mat, CaptureError> {
        let capture = self
            .capture
            .as_mut()
            .ok_or_else(|| CaptureError::Connection("capture not initialized".to_string()))?;

        let mut frame = Mat::default();
        match capture.read(&mut frame) {
            Ok(true) if !frame.empty() => Ok(frame),
            Ok(_) => Err(CaptureError::Connection("failed to read frame".to_string())),
            Err(e) => Err(CaptureError::Connection(e.to_string())),
        }
    }
}

/// Bounded-duration read. The grabber moves onto the blocking pool and is
/// handed back on completion; on timeout the handle is forfeited with the
/// abandoned read and the worker must reinitialize.
pub async fn capture_frame(
    grabber: FrameGrabber,
    timeout: Duration,
) -> (Option<FrameGrabber>, Result<Mat, CaptureError>) {
    let read_task = tokio::task::spawn_blocking(move || {
        let mut grabber = grabber;
        let result = grabber.read();
        (grabber, result)
    });

    match tokio::time::timeout(timeout, read_task).await {
        Ok(Ok((grabber, result))) => (Some(grabber), result),
        Ok(Err(e)) => (
            None,
            Err(CaptureError::Connection(format!("read task failed: {e}"))),
        ),
        Err(_) => (None, Err(CaptureError::Timeout)),
    }
}

/// Open a capture handle off the runtime.
pub async fn initialize(url: &str) -> Option<FrameGrabber> {
    let url = url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut grabber = FrameGrabber::new(&url);
        if grabber.initialize() {
            Some(grabber)
        } else {
            None
        }
    })
    .await
    .ok()
    .flatten()
}

pub fn compress_jpeg(frame: &Mat, quality: i32) -> Option<Vec<u8>> {
    let mut buf = Vector::<u8>::new();
    let mut params = Vector::<i32>::new();
    params.push(imgcodecs::IMWRITE_JPEG_QUALITY);
    params.push(quality.clamp(1, 100));
    imgcodecs::imencode(".jpg", frame, &mut buf, &params).ok()?;
    Some(buf.to_vec())
}
