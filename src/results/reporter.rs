use serde::Serialize;

use super::{DetectedResult, TrustStatus};

/// Wire shape expected by the violation backend.
#[derive(Debug, Serialize)]
struct ViolationRecord<'a> {
    camera_input_url: &'a str,
    tracking_id: &'a str,
    violate_image: &'a str,
    plate_number: &'a str,
    confidence: f32,
    status: TrustStatus,
    time: &'a str,
}

/// Posts violation batches to the backend persistence service. Delivery is
/// fire-and-forget: a failed POST is logged and the batch dropped.
pub struct ViolationReporter {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl ViolationReporter {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    pub async fn report(&self, camera_url: &str, results: &[DetectedResult]) {
        let Some(endpoint) = &self.endpoint else {
            return;
        };
        if results.is_empty() {
            return;
        }

        let batch: Vec<ViolationRecord<'_>> = results
            .iter()
            .map(|r| ViolationRecord {
                camera_input_url: camera_url,
                tracking_id: &r.tracking_id,
                violate_image: &r.image,
                plate_number: r.plate_number.as_deref().unwrap_or("None"),
                confidence: if r.plate_number.is_some() {
                    r.plate_conf
                } else {
                    -1.0
                },
                status: r.status,
                time: &r.time,
            })
            .collect();

        match self.client.post(endpoint).json(&batch).send().await {
            Ok(response) => {
                tracing::debug!(
                    camera = %camera_url,
                    count = batch.len(),
                    status = %response.status(),
                    "violation batch posted"
                );
            }
            Err(e) => {
                tracing::error!(
                    camera = %camera_url,
                    count = batch.len(),
                    error = %e,
                    "violation post failed, batch dropped"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::ViolationKind;

    #[test]
    fn record_serializes_backend_field_names() {
        let result = DetectedResult {
            tracking_id: "42_1700000000".to_string(),
            image: "aGVsbG8=".to_string(),
            violation: ViolationKind::NoHelmet,
            plate_number: Some("77-L1 270.62".to_string()),
            plate_conf: 0.93,
            camera_id: "ab12cd34".to_string(),
            status: TrustStatus::AiReliable,
            time: "2026-01-01T00:00:00Z".to_string(),
        };
        let record = ViolationRecord {
            camera_input_url: "rtsp://cam/1",
            tracking_id: &result.tracking_id,
            violate_image: &result.image,
            plate_number: result.plate_number.as_deref().unwrap(),
            confidence: result.plate_conf,
            status: result.status,
            time: &result.time,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["camera_input_url"], "rtsp://cam/1");
        assert_eq!(json["violate_image"], "aGVsbG8=");
        assert_eq!(json["plate_number"], "77-L1 270.62");
        assert_eq!(json["status"], "AI reliable");
    }

    #[test]
    fn missing_plate_posts_sentinel_values() {
        let record = ViolationRecord {
            camera_input_url: "rtsp://cam/1",
            tracking_id: "7_1700000000",
            violate_image: "x",
            plate_number: "None",
            confidence: -1.0,
            status: TrustStatus::AiDetected,
            time: "None",
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["plate_number"], "None");
        assert_eq!(json["confidence"], -1.0);
        assert_eq!(json["status"], "AI detected");
    }
}
