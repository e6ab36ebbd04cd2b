use std::path::Path;

use anyhow::{Context, Result};
use opencv::{
    core::{Mat, Rect, Size},
    imgcodecs, imgproc,
    prelude::*,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use super::gallery::{name_from_path, FaceGallery};
use super::FaceIdentifier;
use crate::error::DetectorError;
use crate::pose::bgr_to_nchw;
use crate::tracking::BoundingBox;

/// ArcFace系モデルの入力サイズ
const FACE_INPUT_SIZE: i32 = 112;
const FACE_MEAN: f32 = 127.5;
const FACE_SCALE: f32 = 1.0 / 127.5;

/// ONNX顔埋め込みモデル + 登録済みギャラリーによる識別
pub struct OnnxFaceEmbedder {
    session: Session,
    gallery: FaceGallery,
}

impl OnnxFaceEmbedder {
    pub fn new(model_path: &str, similarity_threshold: f32) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load face model {model_path}"))?;
        Ok(Self {
            session,
            gallery: FaceGallery::new(similarity_threshold),
        })
    }

    /// ディレクトリ内の画像を登録する（ファイル名が人名）。読めない画像はスキップ
    pub fn load_gallery(&mut self, db_path: &Path) -> Result<usize> {
        if !db_path.exists() {
            std::fs::create_dir_all(db_path)
                .with_context(|| format!("Failed to create {}", db_path.display()))?;
            tracing::warn!(path = %db_path.display(), "face database was missing, created empty");
            return Ok(0);
        }

        let mut loaded = 0;
        for entry in std::fs::read_dir(db_path).with_context(|| format!("Failed to read {}", db_path.display()))? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"));
            if !is_image {
                continue;
            }
            let Some(name) = name_from_path(&path) else {
                continue;
            };

            let image = imgcodecs::imread(&path.to_string_lossy(), imgcodecs::IMREAD_COLOR)?;
            if image.empty() {
                tracing::warn!(path = %path.display(), "skipping unreadable face image");
                continue;
            }
            match self.embed(&image) {
                Ok(embedding) => {
                    self.gallery.insert(name, embedding);
                    loaded += 1;
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to embed face image"),
            }
        }

        tracing::info!(count = loaded, path = %db_path.display(), "face gallery loaded");
        Ok(loaded)
    }

    /// 顔画像（BGR）→ 埋め込みベクトル
    pub fn embed(&mut self, face: &Mat) -> Result<Vec<f32>, DetectorError> {
        let mut resized = Mat::default();
        imgproc::resize(
            face,
            &mut resized,
            Size::new(FACE_INPUT_SIZE, FACE_INPUT_SIZE),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )
        .map_err(|e| DetectorError::Image(e.to_string()))?;

        let input = bgr_to_nchw(&resized, FACE_MEAN, FACE_SCALE).map_err(|e| DetectorError::Image(e.to_string()))?;
        let input_tensor = Tensor::from_array(input).map_err(|e| DetectorError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| DetectorError::Inference(e.to_string()))?;

        let output: ndarray::ArrayViewD<f32> = outputs[0]
            .try_extract_array()
            .map_err(|e| DetectorError::InvalidOutput(e.to_string()))?;
        Ok(output.iter().copied().collect())
    }
}

/// フレーム内に収まるように矩形を切り詰める
fn clamp_rect(frame: &Mat, bbox: &BoundingBox) -> Option<Rect> {
    let x = (bbox.x.max(0.0) as i32).min(frame.cols());
    let y = (bbox.y.max(0.0) as i32).min(frame.rows());
    let w = ((bbox.x + bbox.width) as i32).min(frame.cols()) - x;
    let h = ((bbox.y + bbox.height) as i32).min(frame.rows()) - y;
    if w <= 0 || h <= 0 {
        return None;
    }
    Some(Rect::new(x, y, w, h))
}

impl FaceIdentifier for OnnxFaceEmbedder {
    type Frame = Mat;

    fn identify(&mut self, frame: &Mat, face: &BoundingBox) -> Result<String, DetectorError> {
        let Some(rect) = clamp_rect(frame, face) else {
            return Err(DetectorError::Image("face outside frame".to_string()));
        };
        let roi = Mat::roi(frame, rect).map_err(|e| DetectorError::Image(e.to_string()))?;
        let crop = roi.try_clone().map_err(|e| DetectorError::Image(e.to_string()))?;
        let embedding = self.embed(&crop)?;
        Ok(self.gallery.identify(&embedding).to_string())
    }
}
