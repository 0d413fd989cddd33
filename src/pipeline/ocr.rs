use std::sync::OnceLock;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

use crate::camera::compress_jpeg;

use super::backends::{BackendError, PlateRecognizer};

const OCR_TIMEOUT: Duration = Duration::from_secs(10);
const CROP_JPEG_QUALITY: i32 = 95;

#[derive(Debug, Deserialize)]
struct OcrResponse {
    text: Option<String>,
    confidence: Option<f32>,
}

/// Plate OCR over HTTP: posts the JPEG crop to an external recognition
/// service. The client is created lazily because recognition always runs on
/// the blocking pool.
pub struct RemoteOcr {
    endpoint: String,
    client: OnceLock<reqwest::blocking::Client>,
}

impl RemoteOcr {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> &reqwest::blocking::Client {
        self.client.get_or_init(|| {
            reqwest::blocking::Client::builder()
                .timeout(OCR_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::blocking::Client::new())
        })
    }
}

impl PlateRecognizer for RemoteOcr {
    fn recognize(&self, plate: &opencv::core::Mat) -> Result<Option<(String, f32)>, BackendError> {
        let Some(jpeg) = compress_jpeg(plate, CROP_JPEG_QUALITY) else {
            return Ok(None);
        };

        let body = serde_json::json!({ "image_base64": BASE64.encode(jpeg) });
        let response = self
            .client()
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|e| BackendError::Inference(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BackendError::Inference(format!(
                "ocr service returned {}",
                response.status()
            )));
        }

        let parsed: OcrResponse = response
            .json()
            .map_err(|e| BackendError::Inference(e.to_string()))?;

        match (parsed.text, parsed.confidence) {
            (Some(text), Some(confidence)) if !text.is_empty() => Ok(Some((text, confidence))),
            _ => Ok(None),
        }
    }
}

/// Stand-in used when no OCR endpoint is configured; plates are simply not
/// recognized.
pub struct DisabledOcr;

impl PlateRecognizer for DisabledOcr {
    fn recognize(&self, _plate: &opencv::core::Mat) -> Result<Option<(String, f32)>, BackendError> {
        Ok(None)
    }
}
