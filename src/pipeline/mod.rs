pub mod association;
pub mod backends;
pub mod plate;

mod annotate;
mod infer;
mod ocr;
mod onnx;
mod track;

pub use infer::{InferencePipeline, PipelineError};
pub use ocr::{DisabledOcr, RemoteOcr};
pub use onnx::OnnxDetector;
pub use track::IouTracker;
