use anyhow::{Context, Result};
use opencv::{core::Mat, prelude::*};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use super::estimator::{non_max_suppression, PersonDetection, PoseEstimator};
use super::keypoint::{Keypoint, KeypointIndex, Pose};
use super::preprocess::letterbox_nchw;
use crate::error::DetectorError;
use crate::tracking::BoundingBox;

const NMS_IOU_THRESHOLD: f32 = 0.45;
/// 出力チャンネル数: 4 (cx, cy, w, h) + 1 (person score) + 17 * 3
const OUTPUT_CHANNELS: usize = 5 + KeypointIndex::COUNT * 3;

/// YOLOv8-pose (ONNX) による人物検出 + 骨格推定
pub struct YoloPoseDetector {
    session: Session,
    input_size: i32,
    score_threshold: f32,
}

impl YoloPoseDetector {
    /// ONNXモデルを読み込んで初期化
    pub fn new(model_path: &str, input_size: i32, score_threshold: f32) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load pose model {model_path}"))?;
        Ok(Self {
            session,
            input_size,
            score_threshold,
        })
    }
}

impl PoseEstimator for YoloPoseDetector {
    type Frame = Mat;

    fn estimate(&mut self, frame: &Mat) -> Result<Vec<PersonDetection>, DetectorError> {
        if frame.empty() {
            return Ok(Vec::new());
        }
        let (input, letterbox) =
            letterbox_nchw(frame, self.input_size).map_err(|e| DetectorError::Image(e.to_string()))?;

        let input_tensor =
            Tensor::from_array(input).map_err(|e| DetectorError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs!["images" => input_tensor])
            .map_err(|e| DetectorError::Inference(e.to_string()))?;

        // 出力: [1, 56, N]
        let output: ndarray::ArrayViewD<f32> = outputs["output0"]
            .try_extract_array()
            .map_err(|e| DetectorError::InvalidOutput(e.to_string()))?;
        let shape = output.shape();
        if shape.len() != 3 || shape[1] != OUTPUT_CHANNELS {
            return Err(DetectorError::InvalidOutput(format!("unexpected shape {shape:?}")));
        }

        let mut candidates = Vec::new();
        for i in 0..shape[2] {
            let score = output[[0, 4, i]];
            if score < self.score_threshold {
                continue;
            }
            let cx = output[[0, 0, i]];
            let cy = output[[0, 1, i]];
            let w = output[[0, 2, i]];
            let h = output[[0, 3, i]];
            let (x1, y1) = letterbox.to_frame(cx - w / 2.0, cy - h / 2.0);
            let (x2, y2) = letterbox.to_frame(cx + w / 2.0, cy + h / 2.0);

            let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
            for (k, kp) in keypoints.iter_mut().enumerate() {
                let base = 5 + k * 3;
                let (x, y) = letterbox.to_frame(output[[0, base, i]], output[[0, base + 1, i]]);
                *kp = Keypoint::new(x, y, output[[0, base + 2, i]]);
            }

            candidates.push(PersonDetection {
                bbox: BoundingBox::from_corners(x1, y1, x2, y2),
                score,
                pose: Some(Pose::new(keypoints)),
            });
        }

        Ok(non_max_suppression(candidates, NMS_IOU_THRESHOLD))
    }
}
