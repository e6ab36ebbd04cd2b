use crate::error::DetectorError;
use crate::tracking::BoundingBox;

use super::keypoint::Pose;

/// 1人分の検出結果
#[derive(Debug, Clone, PartialEq)]
pub struct PersonDetection {
    pub bbox: BoundingBox,
    pub score: f32,
    /// キーポイントを出さないモデルではNone
    pub pose: Option<Pose>,
}

/// フレームから人物の矩形と骨格を推定する
pub trait PoseEstimator {
    type Frame;

    fn estimate(&mut self, frame: &Self::Frame) -> Result<Vec<PersonDetection>, DetectorError>;
}

/// スコア降順の貪欲NMS
pub fn non_max_suppression(mut detections: Vec<PersonDetection>, iou_threshold: f32) -> Vec<PersonDetection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<PersonDetection> = Vec::with_capacity(detections.len());
    for det in detections {
        if kept.iter().all(|k| k.bbox.iou(&det.bbox) <= iou_threshold) {
            kept.push(det);
        }
    }
    kept
}
