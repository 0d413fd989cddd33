use std::sync::Arc;

use opencv::core::Mat;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("opencv error: {0}")]
    Cv(#[from] opencv::Error),
}

/// Detection classes produced by the model head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetClass {
    Vehicle,
    Helmet,
    NoHelmet,
    LicensePlate,
}

impl DetClass {
    pub fn from_id(id: usize) -> Option<Self> {
        match id {
            0 => Some(Self::Vehicle),
            1 => Some(Self::Helmet),
            2 => Some(Self::NoHelmet),
            3 => Some(Self::LicensePlate),
            _ => None,
        }
    }
}

/// Axis-aligned box in original frame coordinates (x1,y1 top-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        (self.width()).max(0.0) * (self.height()).max(0.0)
    }

    pub fn intersection_area(&self, other: &BBox) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        w * h
    }

    pub fn center_y(&self) -> f32 {
        (self.y1 + self.y2) / 2.0
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct Detection {
    pub class: DetClass,
    pub bbox: BBox,
    pub confidence: f32,
}

/// Vehicle box with a tracker-assigned id stable across frames.
#[derive(Debug, Clone)]
pub struct TrackedVehicle {
    pub track_id: u64,
    pub bbox: BBox,
}

/// Object detector over a single frame.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Mat) -> Result<Vec<Detection>, BackendError>;
}

/// Multi-object tracker; fed vehicle-class detections only. Stateful per
/// camera, so the pipeline keeps one instance per registered stream.
pub trait Tracker: Send {
    fn track(&mut self, vehicles: &[Detection], frame: &Mat) -> Result<Vec<TrackedVehicle>, BackendError>;
}

/// OCR over a cropped plate region. Returns the raw text (may contain a
/// newline between plate lines) and the mean character confidence.
pub trait PlateRecognizer: Send + Sync {
    fn recognize(&self, plate: &Mat) -> Result<Option<(String, f32)>, BackendError>;
}

pub type TrackerFactory = Box<dyn Fn() -> Box<dyn Tracker> + Send + Sync>;

/// The pluggable model stack consumed by the pipeline.
pub struct Backends {
    pub detector: Arc<dyn Detector>,
    pub recognizer: Arc<dyn PlateRecognizer>,
    /// Trackers are stateful, so each camera gets a fresh instance.
    pub tracker_factory: TrackerFactory,
}
