use std::sync::Mutex;

use ndarray::{Array4, ArrayViewD};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;

use super::backends::{BBox, BackendError, DetClass, Detection, Detector};

const INPUT_SIZE: u32 = 640;

/// ONNX detector over the four-class helmet-violation model head:
/// vehicle, helmet, no_helmet, license_plate.
pub struct OnnxDetector {
    session: Mutex<Session>,
    confidence_threshold: f32,
}

impl OnnxDetector {
    pub fn new(model_path: &str, confidence_threshold: f32) -> Result<Self, BackendError> {
        let builder = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(4))
            .map_err(|e| BackendError::Inference(e.to_string()))?;

        let session = if model_path.starts_with("http://") || model_path.starts_with("https://") {
            builder.commit_from_url(model_path)
        } else {
            builder.commit_from_file(model_path)
        }
        .map_err(|e| BackendError::Inference(e.to_string()))?;

        Ok(Self {
            session: Mutex::new(session),
            confidence_threshold,
        })
    }

    fn preprocess(frame: &opencv::core::Mat) -> Result<(Array4<f32>, f32, f32, f32), BackendError> {
        use opencv::core::{Mat, Size, BORDER_CONSTANT};
        use opencv::imgproc;
        use opencv::prelude::*;

        let rows = frame.rows() as f32;
        let cols = frame.cols() as f32;
        let input_size = INPUT_SIZE as f32;

        let scale = (input_size / cols).min(input_size / rows);
        let new_w = (cols * scale).round() as i32;
        let new_h = (rows * scale).round() as i32;

        let mut resized = Mat::default();
        imgproc::resize(
            frame,
            &mut resized,
            Size::new(new_w, new_h),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let pad_x = ((input_size as i32 - new_w) / 2) as f32;
        let pad_y = ((input_size as i32 - new_h) / 2) as f32;

        let mut padded = Mat::default();
        opencv::core::copy_make_border(
            &resized,
            &mut padded,
            pad_y as i32,
            input_size as i32 - new_h - pad_y as i32,
            pad_x as i32,
            input_size as i32 - new_w - pad_x as i32,
            BORDER_CONSTANT,
            opencv::core::Scalar::new(114.0, 114.0, 114.0, 0.0),
        )?;

        let mut rgb = Mat::default();
        imgproc::cvt_color(&padded, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

        let data = rgb.data_bytes()?;
        let total_size = (INPUT_SIZE * INPUT_SIZE * 3) as usize;
        if data.len() < total_size {
            return Err(BackendError::Inference("frame data too small".to_string()));
        }

        let mut tensor = Array4::<f32>::zeros((1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize));
        for y in 0..INPUT_SIZE as usize {
            for x in 0..INPUT_SIZE as usize {
                let idx = (y * INPUT_SIZE as usize + x) * 3;
                tensor[[0, 0, y, x]] = data[idx] as f32 / 255.0;
                tensor[[0, 1, y, x]] = data[idx + 1] as f32 / 255.0;
                tensor[[0, 2, y, x]] = data[idx + 2] as f32 / 255.0;
            }
        }

        Ok((tensor, scale, pad_x, pad_y))
    }

    #[allow(clippy::too_many_arguments)]
    fn postprocess(
        logits: &ArrayViewD<f32>,
        boxes: &ArrayViewD<f32>,
        confidence_threshold: f32,
        scale: f32,
        pad_x: f32,
        pad_y: f32,
        orig_w: f32,
        orig_h: f32,
    ) -> Vec<Detection> {
        let logits_shape = logits.shape();
        if logits_shape.len() < 2 {
            return Vec::new();
        }

        let (num_detections, num_classes) = if logits_shape.len() == 3 {
            (logits_shape[1], logits_shape[2])
        } else {
            (logits_shape[0], logits_shape[1])
        };

        let (Some(logits_flat), Some(boxes_flat)) = (logits.as_slice(), boxes.as_slice()) else {
            return Vec::new();
        };

        let input_size = INPUT_SIZE as f32;
        let mut detections = Vec::new();

        for i in 0..num_detections {
            let mut max_score = 0.0f32;
            let mut max_class = 0usize;
            for j in 0..num_classes {
                let logit = logits_flat[i * num_classes + j];
                let score = 1.0 / (1.0 + (-logit).exp());
                if score > max_score {
                    max_score = score;
                    max_class = j;
                }
            }

            if max_score < confidence_threshold {
                continue;
            }
            let Some(class) = DetClass::from_id(max_class) else {
                continue;
            };

            // Boxes arrive as (cx, cy, w, h) normalized to the model input.
            let cx = boxes_flat[i * 4] * input_size;
            let cy = boxes_flat[i * 4 + 1] * input_size;
            let w = boxes_flat[i * 4 + 2] * input_size;
            let h = boxes_flat[i * 4 + 3] * input_size;

            let x1 = (((cx - w / 2.0) - pad_x) / scale).clamp(0.0, orig_w);
            let y1 = (((cy - h / 2.0) - pad_y) / scale).clamp(0.0, orig_h);
            let x2 = (x1 + w / scale).min(orig_w);
            let y2 = (y1 + h / scale).min(orig_h);

            detections.push(Detection {
                class,
                bbox: BBox::new(x1, y1, x2, y2),
                confidence: max_score,
            });
        }

        detections
    }
}

impl Detector for OnnxDetector {
    fn detect(&self, frame: &opencv::core::Mat) -> Result<Vec<Detection>, BackendError> {
        use opencv::prelude::*;

        if frame.rows() == 0 || frame.cols() == 0 {
            return Ok(Vec::new());
        }
        let orig_w = frame.cols() as f32;
        let orig_h = frame.rows() as f32;

        let (input_tensor, scale, pad_x, pad_y) = Self::preprocess(frame)?;

        let mut session = self.session.lock().unwrap();
        let tensor_ref = TensorRef::from_array_view(input_tensor.view())
            .map_err(|e| BackendError::Inference(e.to_string()))?
            .into_dyn();
        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| BackendError::Inference(e.to_string()))?;

        let (Some(logits_val), Some(boxes_val)) = (outputs.get("logits"), outputs.get("pred_boxes"))
        else {
            return Err(BackendError::Inference(
                "unsupported model format: expected 'logits' and 'pred_boxes' outputs".to_string(),
            ));
        };

        let logits = logits_val
            .try_extract_array::<f32>()
            .map_err(|e| BackendError::Inference(e.to_string()))?
            .to_owned();
        let boxes = boxes_val
            .try_extract_array::<f32>()
            .map_err(|e| BackendError::Inference(e.to_string()))?
            .to_owned();
        drop(outputs);

        Ok(Self::postprocess(
            &logits.view(),
            &boxes.view(),
            self.confidence_threshold,
            scale,
            pad_x,
            pad_y,
            orig_w,
            orig_h,
        ))
    }
}
