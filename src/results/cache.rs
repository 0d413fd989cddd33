use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::{AiResult, DeviceDetection};

#[derive(Default)]
struct CacheInner {
    /// Latest compressed raw frame per camera; exactly one buffered frame.
    raw_frames: HashMap<String, Vec<u8>>,
    /// Latest per-camera snapshot.
    results: HashMap<String, AiResult>,
    /// Aggregate over all cameras, rebuilt on every publish.
    global: Option<AiResult>,
}

/// Latest-result storage shared between the camera workers and the HTTP
/// side. Snapshots are only ever replaced as a whole so readers never
/// observe a torn result.
pub struct ResultCache {
    inner: RwLock<CacheInner>,
    registered: RwLock<HashSet<String>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            registered: RwLock::new(HashSet::new()),
        }
    }

    pub fn register(&self, stream_id: &str) {
        self.registered
            .write()
            .unwrap()
            .insert(stream_id.to_string());
    }

    /// Drop every slot for the camera. Results from a tick racing this
    /// removal are discarded at publish time.
    pub fn deregister(&self, stream_id: &str) {
        self.registered
            .write()
            .unwrap()
            .remove(stream_id);
        let mut inner = self.inner.write().unwrap();
        inner.raw_frames.remove(stream_id);
        inner.results.remove(stream_id);
        inner.global = Self::rebuild_global(&inner.results);
    }

    fn is_registered(&self, stream_id: &str) -> bool {
        self.registered.read().unwrap().contains(stream_id)
    }

    pub fn store_raw_frame(&self, stream_id: &str, jpeg: Vec<u8>) {
        if !self.is_registered(stream_id) {
            return;
        }
        self.inner
            .write()
            .unwrap()
            .raw_frames
            .insert(stream_id.to_string(), jpeg);
    }

    /// Replace the camera's snapshot and rebuild the global aggregate under
    /// the same lock. Publishes for deregistered cameras are dropped.
    pub fn publish(&self, stream_id: &str, detection: DeviceDetection, time: f64) {
        if !self.is_registered(stream_id) {
            tracing::debug!(camera = %stream_id, "discarding result for removed camera");
            return;
        }
        let mut inner = self.inner.write().unwrap();
        inner.results.insert(
            stream_id.to_string(),
            AiResult {
                time,
                device_list: vec![detection],
            },
        );
        let mut global = AiResult {
            time,
            device_list: Vec::with_capacity(inner.results.len()),
        };
        for result in inner.results.values() {
            global.device_list.extend(result.device_list.iter().cloned());
        }
        inner.global = Some(global);
    }

    fn rebuild_global(results: &HashMap<String, AiResult>) -> Option<AiResult> {
        let latest = results.values().map(|r| r.time).fold(None, |acc: Option<f64>, t| {
            Some(acc.map_or(t, |a| a.max(t)))
        })?;
        let mut device_list = Vec::with_capacity(results.len());
        for result in results.values() {
            device_list.extend(result.device_list.iter().cloned());
        }
        Some(AiResult {
            time: latest,
            device_list,
        })
    }

    pub fn latest_global(&self) -> Option<AiResult> {
        self.inner
            .read()
            .unwrap()
            .global
            .clone()
    }

    pub fn latest_for(&self, stream_id: &str) -> Option<AiResult> {
        self.inner
            .read()
            .unwrap()
            .results
            .get(stream_id)
            .cloned()
    }

    pub fn raw_frame(&self, stream_id: &str) -> Option<Vec<u8>> {
        self.inner
            .read()
            .unwrap()
            .raw_frames
            .get(stream_id)
            .cloned()
    }

    /// Annotated frame from the latest result, if any.
    pub fn annotated_frame(&self, stream_id: &str) -> Option<Vec<u8>> {
        let inner = self.inner.read().unwrap();
        let result = inner.results.get(stream_id)?;
        let device = result.device_list.first()?;
        if device.post_frame.is_empty() {
            None
        } else {
            Some(device.post_frame.clone())
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(camera_id: &str) -> DeviceDetection {
        DeviceDetection {
            camera_id: camera_id.to_string(),
            post_frame: vec![1, 2, 3],
            detected_result: Vec::new(),
        }
    }

    #[test]
    fn publish_replaces_snapshot_wholesale() {
        let cache = ResultCache::new();
        cache.register("cam1");

        cache.publish("cam1", detection("cam1"), 1.0);
        cache.publish("cam1", detection("cam1"), 2.0);

        let result = cache.latest_for("cam1").unwrap();
        assert_eq!(result.time, 2.0);
        assert_eq!(result.device_list.len(), 1);

        let global = cache.latest_global().unwrap();
        assert_eq!(global.time, 2.0);
        assert_eq!(global.device_list.len(), 1);
    }

    #[test]
    fn global_aggregates_all_cameras() {
        let cache = ResultCache::new();
        cache.register("cam1");
        cache.register("cam2");

        cache.publish("cam1", detection("cam1"), 1.0);
        cache.publish("cam2", detection("cam2"), 2.0);

        let global = cache.latest_global().unwrap();
        assert_eq!(global.device_list.len(), 2);
    }

    #[test]
    fn reads_after_removal_are_absent() {
        let cache = ResultCache::new();
        cache.register("cam1");
        cache.store_raw_frame("cam1", vec![9]);
        cache.publish("cam1", detection("cam1"), 1.0);

        cache.deregister("cam1");

        assert!(cache.latest_for("cam1").is_none());
        assert!(cache.raw_frame("cam1").is_none());
        assert!(cache.annotated_frame("cam1").is_none());
        assert!(cache.latest_global().is_none());
    }

    #[test]
    fn publish_racing_removal_is_discarded() {
        let cache = ResultCache::new();
        cache.register("cam1");
        cache.deregister("cam1");

        // A tick that was in flight when the camera was removed.
        cache.publish("cam1", detection("cam1"), 1.0);
        cache.store_raw_frame("cam1", vec![9]);

        assert!(cache.latest_for("cam1").is_none());
        assert!(cache.raw_frame("cam1").is_none());
    }

    #[test]
    fn removal_keeps_other_cameras_in_global() {
        let cache = ResultCache::new();
        cache.register("cam1");
        cache.register("cam2");
        cache.publish("cam1", detection("cam1"), 1.0);
        cache.publish("cam2", detection("cam2"), 2.0);

        cache.deregister("cam1");

        let global = cache.latest_global().unwrap();
        assert_eq!(global.device_list.len(), 1);
        assert_eq!(global.device_list[0].camera_id, "cam2");
    }
}
