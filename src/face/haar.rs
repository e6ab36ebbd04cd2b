use anyhow::{Context, Result};
use opencv::{
    core::{Mat, Rect, Size, Vector},
    imgproc,
    objdetect::CascadeClassifier,
    prelude::*,
};

use super::FaceDetector;
use crate::error::DetectorError;
use crate::tracking::BoundingBox;

const SCALE_FACTOR: f64 = 1.1;
const MIN_NEIGHBORS: i32 = 5;

/// Haar cascade による正面顔検出
pub struct HaarFaceDetector {
    classifier: CascadeClassifier,
    min_size: i32,
}

impl HaarFaceDetector {
    pub fn new(cascade_path: &str, min_size: i32) -> Result<Self> {
        let classifier = CascadeClassifier::new(cascade_path)
            .with_context(|| format!("Failed to load cascade {cascade_path}"))?;
        if classifier.empty()? {
            anyhow::bail!("Cascade {} is empty", cascade_path);
        }
        Ok(Self { classifier, min_size })
    }
}

impl FaceDetector for HaarFaceDetector {
    type Frame = Mat;

    fn detect(&mut self, frame: &Mat) -> Result<Vec<BoundingBox>, DetectorError> {
        if frame.empty() {
            return Ok(Vec::new());
        }
        let mut gray = Mat::default();
        imgproc::cvt_color_def(frame, &mut gray, imgproc::COLOR_BGR2GRAY)
            .map_err(|e| DetectorError::Image(e.to_string()))?;

        let mut faces = Vector::<Rect>::new();
        self.classifier
            .detect_multi_scale(
                &gray,
                &mut faces,
                SCALE_FACTOR,
                MIN_NEIGHBORS,
                0,
                Size::new(self.min_size, self.min_size),
                Size::new(0, 0),
            )
            .map_err(|e| DetectorError::Inference(e.to_string()))?;

        Ok(faces
            .iter()
            .map(|r| BoundingBox::new(r.x as f32, r.y as f32, r.width as f32, r.height as f32))
            .collect())
    }
}
