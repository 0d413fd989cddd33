mod cache;
mod reporter;

pub use cache::ResultCache;
pub use reporter::ViolationReporter;

use serde::Serialize;

/// Violation categories recognized by the downstream backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViolationKind {
    #[serde(rename = "no_helmet")]
    NoHelmet,
}

/// How much the backend may trust a result without human review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrustStatus {
    #[serde(rename = "AI detected")]
    AiDetected,
    #[serde(rename = "AI reliable")]
    AiReliable,
}

/// One violating vehicle, ready for the reporter and the result API.
#[derive(Debug, Clone, Serialize)]
pub struct DetectedResult {
    pub tracking_id: String,
    /// Base64 JPEG crop of the vehicle.
    pub image: String,
    pub violation: ViolationKind,
    pub plate_number: Option<String>,
    pub plate_conf: f32,
    pub camera_id: String,
    pub status: TrustStatus,
    pub time: String,
}

/// Everything one camera produced for one processed frame.
#[derive(Debug, Clone)]
pub struct DeviceDetection {
    pub camera_id: String,
    /// Annotated frame, JPEG-encoded.
    pub post_frame: Vec<u8>,
    pub detected_result: Vec<DetectedResult>,
}

/// Snapshot served to result consumers; replaced wholesale every publish.
#[derive(Debug, Clone)]
pub struct AiResult {
    pub time: f64,
    pub device_list: Vec<DeviceDetection>,
}
