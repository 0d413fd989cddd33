use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use super::health::BreakerState;
use super::worker::{self, WorkerContext};

const SUPPORTED_SCHEMES: [&str; 3] = ["rtsp://", "http://", "https://"];

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("unsupported stream URL: {0}")]
    Validation(String),
    #[error("stream URL not found: {0}")]
    NotFound(String),
}

/// Public identity of a registered stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub camera_id: String,
    pub stream_url: String,
}

/// Per-camera health view served by the API.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CameraHealthEntry {
    pub url: String,
    pub camera_id: String,
    pub state: BreakerState,
    pub error_count: u32,
    pub last_error: Option<String>,
}

struct StreamEntry {
    stream_id: String,
    stop: watch::Sender<bool>,
    worker: tokio::task::JoinHandle<()>,
}

/// Stream id is a pure function of the URL: same URL, same id, always.
pub fn stream_id_for(url: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_bytes())
        .simple()
        .to_string()[..8]
        .to_string()
}

/// Owns the camera lifecycle: registration bookkeeping, worker start/stop,
/// and id lookups. One instance per process, injected where needed.
pub struct StreamRegistry {
    streams: RwLock<HashMap<String, StreamEntry>>,
    ids: RwLock<HashMap<String, String>>,
    ctx: Arc<WorkerContext>,
    stream_path: String,
}

impl StreamRegistry {
    pub fn new(ctx: Arc<WorkerContext>, stream_path: String) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            ids: RwLock::new(HashMap::new()),
            ctx,
            stream_path,
        }
    }

    fn public_url(&self, stream_id: &str) -> String {
        format!("{}{}", self.stream_path, stream_id)
    }

    /// Register a camera and start its worker. Idempotent: a known URL
    /// returns its existing id without starting a second worker.
    pub fn add(&self, url: &str) -> Result<StreamInfo, StreamError> {
        if !SUPPORTED_SCHEMES.iter().any(|s| url.starts_with(s)) {
            return Err(StreamError::Validation(url.to_string()));
        }

        let mut streams = self.streams.write().unwrap();
        if let Some(entry) = streams.get(url) {
            return Ok(StreamInfo {
                camera_id: entry.stream_id.clone(),
                stream_url: self.public_url(&entry.stream_id),
            });
        }

        let stream_id = stream_id_for(url);
        self.ctx.monitor.register(url);
        self.ctx.cache.register(&stream_id);

        let (stop, stop_rx) = watch::channel(false);
        let worker = worker::spawn(
            Arc::clone(&self.ctx),
            url.to_string(),
            stream_id.clone(),
            stop_rx,
        );

        streams.insert(
            url.to_string(),
            StreamEntry {
                stream_id: stream_id.clone(),
                stop,
                worker,
            },
        );
        self.ids
            .write()
            .unwrap()
            .insert(stream_id.clone(), url.to_string());

        tracing::info!(url = %url, camera = %stream_id, "camera stream added");
        Ok(StreamInfo {
            stream_url: self.public_url(&stream_id),
            camera_id: stream_id,
        })
    }

    /// Stop the worker and release every slot for the camera. An in-flight
    /// tick for this camera may still complete; its publish is discarded by
    /// the cache.
    pub fn remove(&self, url: &str) -> Result<(), StreamError> {
        let entry = self
            .streams
            .write()
            .unwrap()
            .remove(url)
            .ok_or_else(|| StreamError::NotFound(url.to_string()))?;

        let _ = entry.stop.send(true);
        self.ids.write().unwrap().remove(&entry.stream_id);
        self.ctx.monitor.deregister(url);
        self.ctx.cache.deregister(&entry.stream_id);
        self.ctx.pipeline.remove_camera(&entry.stream_id);

        tracing::info!(url = %url, camera = %entry.stream_id, "camera stream removed");
        Ok(())
    }

    pub fn list(&self) -> HashMap<String, StreamInfo> {
        self.streams
            .read()
            .unwrap()
            .iter()
            .map(|(url, entry)| {
                (
                    url.clone(),
                    StreamInfo {
                        camera_id: entry.stream_id.clone(),
                        stream_url: self.public_url(&entry.stream_id),
                    },
                )
            })
            .collect()
    }

    pub fn is_valid_stream_id(&self, stream_id: &str) -> bool {
        self.ids.read().unwrap().contains_key(stream_id)
    }

    /// Camera ids and stream ids share one namespace.
    pub fn is_valid_camera_id(&self, camera_id: &str) -> bool {
        self.is_valid_stream_id(camera_id)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.read().unwrap().len()
    }

    /// Breaker state and error bookkeeping for every registered camera.
    pub fn camera_health(&self) -> Vec<CameraHealthEntry> {
        self.streams
            .read()
            .unwrap()
            .iter()
            .map(|(url, entry)| CameraHealthEntry {
                url: url.clone(),
                camera_id: entry.stream_id.clone(),
                state: self.ctx.monitor.state(url).unwrap_or(BreakerState::Healthy),
                error_count: self.ctx.monitor.error_count(url),
                last_error: self.ctx.monitor.last_error(url).map(|(message, _)| message),
            })
            .collect()
    }

    /// Stop all workers; used on process shutdown.
    pub fn shutdown(&self) {
        let mut streams = self.streams.write().unwrap();
        for (url, entry) in streams.drain() {
            let _ = entry.stop.send(true);
            entry.worker.abort();
            self.ctx.monitor.deregister(&url);
            self.ctx.cache.deregister(&entry.stream_id);
        }
        self.ids.write().unwrap().clear();
        tracing::info!("stream registry shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::HealthMonitor;
    use crate::config::{HealthConfig, ProcessingConfig, ThresholdConfig};
    use crate::pipeline::backends::{
        BackendError, Backends, Detection, Detector, PlateRecognizer, TrackedVehicle, Tracker,
    };
    use crate::pipeline::InferencePipeline;
    use crate::results::{ResultCache, ViolationReporter};
    use opencv::core::Mat;
    use tokio::sync::Semaphore;

    struct EmptyDetector;
    impl Detector for EmptyDetector {
        fn detect(&self, _frame: &Mat) -> Result<Vec<Detection>, BackendError> {
            Ok(Vec::new())
        }
    }

    struct EmptyTracker;
    impl Tracker for EmptyTracker {
        fn track(
            &mut self,
            _vehicles: &[Detection],
            _frame: &Mat,
        ) -> Result<Vec<TrackedVehicle>, BackendError> {
            Ok(Vec::new())
        }
    }

    struct EmptyRecognizer;
    impl PlateRecognizer for EmptyRecognizer {
        fn recognize(&self, _plate: &Mat) -> Result<Option<(String, f32)>, BackendError> {
            Ok(None)
        }
    }

    fn registry() -> StreamRegistry {
        let pipeline = Arc::new(InferencePipeline::new(
            Backends {
                detector: Arc::new(EmptyDetector),
                recognizer: Arc::new(EmptyRecognizer),
                tracker_factory: Box::new(|| Box::new(EmptyTracker)),
            },
            4,
            ThresholdConfig::default(),
            80,
        ));
        let ctx = Arc::new(WorkerContext {
            processing: ProcessingConfig {
                interval_ms: 50,
                capture_timeout_ms: 100,
                max_concurrent_processing: 10,
                max_concurrent_ai_tasks: 4,
                jpeg_quality: 80,
            },
            cache: Arc::new(ResultCache::new()),
            monitor: Arc::new(HealthMonitor::new(&HealthConfig::default())),
            pipeline,
            reporter: Arc::new(ViolationReporter::new(None)),
            capture_permits: Arc::new(Semaphore::new(10)),
        });
        StreamRegistry::new(ctx, "/stream/".to_string())
    }

    #[test]
    fn stream_id_is_a_pure_function_of_url() {
        let a = stream_id_for("rtsp://127.0.0.1:9/cam1");
        let b = stream_id_for("rtsp://127.0.0.1:9/cam1");
        let c = stream_id_for("rtsp://127.0.0.1:9/cam2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 8);
    }

    #[tokio::test]
    async fn add_is_idempotent_and_starts_one_worker() {
        let registry = registry();
        let first = registry.add("rtsp://127.0.0.1:9/cam1").unwrap();
        let second = registry.add("rtsp://127.0.0.1:9/cam1").unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.stream_count(), 1);
        assert!(registry.is_valid_stream_id(&first.camera_id));
        assert_eq!(first.stream_url, format!("/stream/{}", first.camera_id));

        registry.shutdown();
    }

    #[tokio::test]
    async fn add_rejects_unsupported_scheme() {
        let registry = registry();
        let err = registry.add("file:///tmp/video.mp4").unwrap_err();
        assert!(matches!(err, StreamError::Validation(_)));
        assert_eq!(registry.stream_count(), 0);
    }

    #[tokio::test]
    async fn remove_unknown_url_is_not_found() {
        let registry = registry();
        let err = registry.remove("rtsp://127.0.0.1:9/camzzz").unwrap_err();
        assert!(matches!(err, StreamError::NotFound(_)));
    }

    #[tokio::test]
    async fn remove_releases_id_and_cache_slots() {
        let registry = registry();
        let info = registry.add("rtsp://127.0.0.1:9/cam1").unwrap();
        registry.ctx.cache.publish(
            &info.camera_id,
            crate::results::DeviceDetection {
                camera_id: info.camera_id.clone(),
                post_frame: vec![1],
                detected_result: Vec::new(),
            },
            1.0,
        );
        assert!(registry.ctx.cache.latest_for(&info.camera_id).is_some());

        registry.remove("rtsp://127.0.0.1:9/cam1").unwrap();

        assert!(!registry.is_valid_stream_id(&info.camera_id));
        assert!(registry.ctx.cache.latest_for(&info.camera_id).is_none());
        assert_eq!(registry.stream_count(), 0);

        registry.shutdown();
    }

    #[tokio::test]
    async fn list_reports_all_streams() {
        let registry = registry();
        registry.add("rtsp://127.0.0.1:9/cam1").unwrap();
        registry.add("rtsp://127.0.0.1:9/cam2").unwrap();

        let listing = registry.list();
        assert_eq!(listing.len(), 2);
        assert!(listing.contains_key("rtsp://127.0.0.1:9/cam1"));

        registry.shutdown();
    }
}
