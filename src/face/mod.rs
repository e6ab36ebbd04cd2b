#[cfg(feature = "desktop")]
pub mod embedder;
pub mod gallery;
#[cfg(feature = "desktop")]
pub mod haar;
pub mod recognizer;

#[cfg(feature = "desktop")]
pub use embedder::OnnxFaceEmbedder;
pub use gallery::{cosine_similarity, name_from_path, FaceGallery};
#[cfg(feature = "desktop")]
pub use haar::HaarFaceDetector;
pub use recognizer::{FaceObservation, FacePipeline, FaceRecognizer, FaceStatus};

use crate::error::DetectorError;
use crate::tracking::BoundingBox;

/// フレームから顔矩形を検出する
pub trait FaceDetector {
    type Frame;

    fn detect(&mut self, frame: &Self::Frame) -> Result<Vec<BoundingBox>, DetectorError>;
}

/// 顔矩形の人物を識別する。該当者なしは `unknown`
pub trait FaceIdentifier {
    type Frame;

    fn identify(&mut self, frame: &Self::Frame, face: &BoundingBox) -> Result<String, DetectorError>;
}
