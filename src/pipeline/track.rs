use opencv::core::Mat;

use super::backends::{BBox, BackendError, Detection, TrackedVehicle, Tracker};

const DEFAULT_IOU_THRESHOLD: f32 = 0.3;
const DEFAULT_MAX_MISSES: u32 = 30;

struct Track {
    id: u64,
    bbox: BBox,
    misses: u32,
}

/// Greedy IoU matcher: good enough as the default vehicle tracker, and
/// replaceable through the `Tracker` trait when something stronger is
/// plugged in.
pub struct IouTracker {
    tracks: Vec<Track>,
    next_id: u64,
    iou_threshold: f32,
    max_misses: u32,
}

impl IouTracker {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_misses: DEFAULT_MAX_MISSES,
        }
    }
}

impl Default for IouTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracker for IouTracker {
    fn track(
        &mut self,
        vehicles: &[Detection],
        _frame: &Mat,
    ) -> Result<Vec<TrackedVehicle>, BackendError> {
        // Best-match pairs first, each track and detection used at most once.
        let mut candidates: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in vehicles.iter().enumerate() {
                let iou = track.bbox.iou(&det.bbox);
                if iou >= self.iou_threshold {
                    candidates.push((ti, di, iou));
                }
            }
        }
        candidates.sort_by(|a, b| b.2.total_cmp(&a.2));

        let mut track_taken = vec![false; self.tracks.len()];
        let mut det_taken = vec![false; vehicles.len()];
        let mut assigned: Vec<(usize, usize)> = Vec::new();
        for (ti, di, _) in candidates {
            if !track_taken[ti] && !det_taken[di] {
                track_taken[ti] = true;
                det_taken[di] = true;
                assigned.push((ti, di));
            }
        }

        let mut output = Vec::with_capacity(vehicles.len());
        for (ti, di) in &assigned {
            let track = &mut self.tracks[*ti];
            track.bbox = vehicles[*di].bbox;
            track.misses = 0;
            output.push(TrackedVehicle {
                track_id: track.id,
                bbox: track.bbox,
            });
        }

        for (di, det) in vehicles.iter().enumerate() {
            if det_taken[di] {
                continue;
            }
            let id = self.next_id;
            self.next_id += 1;
            self.tracks.push(Track {
                id,
                bbox: det.bbox,
                misses: 0,
            });
            output.push(TrackedVehicle {
                track_id: id,
                bbox: det.bbox,
            });
        }

        // Age out tracks that went unmatched this frame.
        for (ti, track) in self.tracks.iter_mut().enumerate() {
            if ti < track_taken.len() && !track_taken[ti] {
                track.misses += 1;
            }
        }
        let max_misses = self.max_misses;
        self.tracks.retain(|t| t.misses <= max_misses);

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::backends::DetClass;

    fn vehicle(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            class: DetClass::Vehicle,
            bbox: BBox::new(x1, y1, x2, y2),
            confidence: 0.9,
        }
    }

    #[test]
    fn id_is_stable_across_frames() {
        let mut tracker = IouTracker::new();
        let frame = Mat::default();

        let first = tracker.track(&[vehicle(0.0, 0.0, 100.0, 100.0)], &frame).unwrap();
        let id = first[0].track_id;

        // Same object, slightly moved.
        let second = tracker.track(&[vehicle(5.0, 5.0, 105.0, 105.0)], &frame).unwrap();
        assert_eq!(second[0].track_id, id);
    }

    #[test]
    fn distinct_objects_get_distinct_ids() {
        let mut tracker = IouTracker::new();
        let frame = Mat::default();

        let tracked = tracker
            .track(
                &[vehicle(0.0, 0.0, 50.0, 50.0), vehicle(200.0, 200.0, 260.0, 260.0)],
                &frame,
            )
            .unwrap();
        assert_eq!(tracked.len(), 2);
        assert_ne!(tracked[0].track_id, tracked[1].track_id);
    }

    #[test]
    fn new_object_after_departure_gets_new_id() {
        let mut tracker = IouTracker::new();
        let frame = Mat::default();

        let first = tracker.track(&[vehicle(0.0, 0.0, 50.0, 50.0)], &frame).unwrap();
        let id = first[0].track_id;

        // Object gone long enough for the track to expire.
        for _ in 0..=DEFAULT_MAX_MISSES {
            tracker.track(&[], &frame).unwrap();
        }

        let reappeared = tracker.track(&[vehicle(0.0, 0.0, 50.0, 50.0)], &frame).unwrap();
        assert_ne!(reappeared[0].track_id, id);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let mut tracker = IouTracker::new();
        let frame = Mat::default();
        assert!(tracker.track(&[], &frame).unwrap().is_empty());
    }
}
