use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use opencv::core::{Mat, Rect, Size};
use opencv::imgproc;
use opencv::prelude::*;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::camera::compress_jpeg;
use crate::config::ThresholdConfig;
use crate::results::{DetectedResult, DeviceDetection, TrustStatus, ViolationKind};

use super::annotate;
use super::association;
use super::backends::{BBox, Backends, DetClass, Detection, Tracker};
use super::plate::{self, PlateStatus};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("backend error: {0}")]
    Backend(#[from] super::backends::BackendError),
    #[error("inference task failed: {0}")]
    Task(String),
}

type SharedTracker = Arc<Mutex<Box<dyn Tracker>>>;

/// Drives detect → track → associate → recognize → annotate for one frame.
/// Admission is bounded by a semaphore so callers beyond the limit block
/// instead of spawning unbounded inference; the CPU-bound work itself runs
/// on the blocking pool.
pub struct InferencePipeline {
    backends: Arc<Backends>,
    trackers: RwLock<HashMap<String, SharedTracker>>,
    permits: Arc<Semaphore>,
    thresholds: ThresholdConfig,
    jpeg_quality: i32,
}

impl InferencePipeline {
    pub fn new(
        backends: Backends,
        max_concurrent_ai_tasks: usize,
        thresholds: ThresholdConfig,
        jpeg_quality: i32,
    ) -> Self {
        Self {
            backends: Arc::new(backends),
            trackers: RwLock::new(HashMap::new()),
            permits: Arc::new(Semaphore::new(max_concurrent_ai_tasks)),
            thresholds,
            jpeg_quality,
        }
    }

    /// Tracker state is per camera so track ids stay stable per stream.
    fn tracker(&self, stream_id: &str) -> SharedTracker {
        if let Some(tracker) = self.trackers.read().unwrap().get(stream_id) {
            return Arc::clone(tracker);
        }
        let mut trackers = self.trackers.write().unwrap();
        Arc::clone(
            trackers
                .entry(stream_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new((self.backends.tracker_factory)()))),
        )
    }

    pub fn remove_camera(&self, stream_id: &str) {
        self.trackers.write().unwrap().remove(stream_id);
    }

    pub async fn process(
        &self,
        frame: Mat,
        stream_id: &str,
    ) -> Result<DeviceDetection, PipelineError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::Task("admission queue closed".to_string()))?;

        let backends = Arc::clone(&self.backends);
        let tracker = self.tracker(stream_id);
        let thresholds = self.thresholds.clone();
        let quality = self.jpeg_quality;
        let stream_id = stream_id.to_string();

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            run_frame(&backends, &tracker, frame, &stream_id, &thresholds, quality)
        })
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))?
    }
}

fn run_frame(
    backends: &Backends,
    tracker: &SharedTracker,
    frame: Mat,
    stream_id: &str,
    thresholds: &ThresholdConfig,
    quality: i32,
) -> Result<DeviceDetection, PipelineError> {
    let detections = backends.detector.detect(&frame)?;

    let (vehicles, accessories): (Vec<Detection>, Vec<Detection>) = detections
        .into_iter()
        .partition(|d| d.class == DetClass::Vehicle);

    let tracked = tracker.lock().unwrap().track(&vehicles, &frame)?;
    let groups = association::group(&tracked, &accessories);

    // Plate recognition only for vehicles carrying a no-helmet detection.
    let mut plate_texts: HashMap<u64, (String, f32)> = HashMap::new();
    for group in groups.iter().filter(|g| g.has_no_helmet()) {
        let Some(plate) = group.best_plate() else {
            continue;
        };
        let Some(crop) = crop_region(&frame, &plate.bbox) else {
            continue;
        };
        let upscaled = match upscale(&crop) {
            Ok(up) => up,
            Err(e) => {
                tracing::warn!(camera = %stream_id, error = %e, "plate upscale failed");
                continue;
            }
        };
        match backends.recognizer.recognize(&upscaled) {
            Ok(Some((text, conf))) => {
                plate_texts.insert(group.track_id, (text, conf));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(camera = %stream_id, error = %e, "plate recognition failed");
            }
        }
    }

    let now = Utc::now();
    let mut detected_result = Vec::new();
    for group in groups.iter().filter(|g| g.has_no_helmet()) {
        let image = crop_region(&frame, &group.bbox)
            .and_then(|crop| compress_jpeg(&crop, quality))
            .map(|jpeg| BASE64.encode(jpeg))
            .unwrap_or_default();

        let (plate_number, plate_conf, status) =
            gate_plate(plate_texts.get(&group.track_id), group.max_no_helmet_conf, thresholds);

        detected_result.push(DetectedResult {
            tracking_id: format!("{}_{}", group.track_id, now.timestamp()),
            image,
            violation: ViolationKind::NoHelmet,
            plate_number,
            plate_conf,
            camera_id: stream_id.to_string(),
            status,
            time: now.to_rfc3339(),
        });
    }

    // Geometry is done; drawing happens on the outgoing copy only.
    let mut post = frame;
    if let Err(e) = annotate::draw_groups(&mut post, &groups, &plate_texts) {
        tracing::warn!(camera = %stream_id, error = %e, "frame annotation failed");
    }
    let post_frame = compress_jpeg(&post, quality).unwrap_or_default();

    Ok(DeviceDetection {
        camera_id: stream_id.to_string(),
        post_frame,
        detected_result,
    })
}

/// Attach and gate the plate reading for one violating vehicle.
fn gate_plate(
    reading: Option<&(String, f32)>,
    max_no_helmet_conf: f32,
    thresholds: &ThresholdConfig,
) -> (Option<String>, f32, TrustStatus) {
    let Some((text, conf)) = reading else {
        return (None, 0.0, TrustStatus::AiDetected);
    };
    if *conf < thresholds.plate {
        return (None, 0.0, TrustStatus::AiDetected);
    }

    let parsed = plate::validate(text);
    if parsed.status == PlateStatus::Certain
        && *conf >= thresholds.plate_certain
        && max_no_helmet_conf >= thresholds.no_helmet_certain
    {
        (Some(parsed.formatted()), *conf, TrustStatus::AiReliable)
    } else {
        (Some(text.replace('\n', " ")), *conf, TrustStatus::AiDetected)
    }
}

fn crop_region(frame: &Mat, bbox: &BBox) -> Option<Mat> {
    let cols = frame.cols();
    let rows = frame.rows();
    if cols == 0 || rows == 0 {
        return None;
    }
    let x1 = (bbox.x1 as i32).clamp(0, cols - 1);
    let y1 = (bbox.y1 as i32).clamp(0, rows - 1);
    let x2 = (bbox.x2 as i32).clamp(0, cols);
    let y2 = (bbox.y2 as i32).clamp(0, rows);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    let roi = Rect::new(x1, y1, x2 - x1, y2 - y1);
    Mat::roi(frame, roi).ok()?.try_clone().ok()
}

/// Quality-preserving 2x upscale before OCR.
fn upscale(crop: &Mat) -> opencv::Result<Mat> {
    let mut out = Mat::default();
    imgproc::resize(crop, &mut out, Size::new(0, 0), 2.0, 2.0, imgproc::INTER_CUBIC)?;
    Ok(out)
}
