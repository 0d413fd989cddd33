mod capture;
mod health;
mod registry;
mod worker;

pub use capture::{compress_jpeg, CaptureError, FrameGrabber};
pub use health::{spawn_sweep, BreakerState, Gate, HealthMonitor};
pub use registry::{stream_id_for, CameraHealthEntry, StreamError, StreamInfo, StreamRegistry};
pub use worker::WorkerContext;
