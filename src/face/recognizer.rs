use crate::config::FaceConfig;
use crate::error::DetectorError;
use crate::tracking::{BoundingBox, EntityId, EntityTracker, LockEvent, TrackerConfig, UNKNOWN_LABEL};

use super::{FaceDetector, FaceIdentifier};

/// 顔エンティティの表示状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaceStatus {
    /// まだ誰とも判定されていない
    Checking,
    /// 候補ラベルあり、ロック前
    Tentative { label: String, count: u32 },
    Locked { label: String },
}

impl FaceStatus {
    /// オーバーレイ用の文字列
    pub fn text(&self, confirm_frames: u32) -> String {
        match self {
            FaceStatus::Checking => "Checking...".to_string(),
            FaceStatus::Tentative { label, count } => format!("{label} {count}/{confirm_frames}"),
            FaceStatus::Locked { label } => format!("{label} (LOCKED)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FaceObservation {
    pub entity_id: EntityId,
    pub bbox: BoundingBox,
    pub status: FaceStatus,
}

/// 顔トラッキング + 識別投票
///
/// 識別は重いので、ロック前のエンティティについて `identify_interval` フレームに1回だけ行う。
pub struct FaceRecognizer {
    tracker: EntityTracker,
    confirm_frames: u32,
    identify_interval: u64,
    frame_index: u64,
}

impl FaceRecognizer {
    pub fn from_config(config: &FaceConfig) -> Self {
        Self {
            tracker: EntityTracker::new(TrackerConfig {
                match_distance: config.match_distance,
                max_missing_frames: config.max_missing_frames,
                ..Default::default()
            }),
            confirm_frames: config.confirm_frames,
            identify_interval: config.identify_interval_frames,
            frame_index: 0,
        }
    }

    pub fn tracker(&self) -> &EntityTracker {
        &self.tracker
    }

    pub fn confirm_frames(&self) -> u32 {
        self.confirm_frames
    }

    /// 1フレーム分の顔矩形を処理する
    ///
    /// `identify` が失敗した顔は投票なしとして扱う。
    pub fn process<I>(&mut self, faces: &[BoundingBox], mut identify: I) -> (Vec<FaceObservation>, Vec<LockEvent>)
    where
        I: FnMut(&BoundingBox) -> Result<String, DetectorError>,
    {
        let frame_index = self.frame_index;
        self.frame_index += 1;

        let ids = self.tracker.match_detections(faces);
        let mut locks = Vec::new();
        let mut observations = Vec::with_capacity(faces.len());

        for (bbox, id) in faces.iter().zip(ids) {
            let Some(entity) = self.tracker.get_mut(id) else {
                continue;
            };

            if !entity.vote.is_locked() && entity.evaluation_due(frame_index, self.identify_interval) {
                entity.mark_evaluated(frame_index);
                match identify(bbox) {
                    Ok(label) => {
                        if let Some(event) = entity.observe_label(&label, self.confirm_frames) {
                            tracing::info!(entity = %event.entity_id, label = %event.label, "face locked");
                            locks.push(event);
                        }
                    }
                    Err(e) => {
                        tracing::debug!(entity = %id, error = %e, "face identification failed");
                    }
                }
            }

            let vote = &entity.vote;
            let status = if vote.is_locked() {
                FaceStatus::Locked {
                    label: vote.label().to_string(),
                }
            } else if vote.label() == UNKNOWN_LABEL {
                FaceStatus::Checking
            } else {
                FaceStatus::Tentative {
                    label: vote.label().to_string(),
                    count: vote.confidence_count(),
                }
            };

            observations.push(FaceObservation {
                entity_id: id,
                bbox: *bbox,
                status,
            });
        }

        (observations, locks)
    }
}

/// 顔検出器 + 識別器 + 認識器の組
pub struct FacePipeline<D, I>
where
    D: FaceDetector,
    I: FaceIdentifier<Frame = D::Frame>,
{
    detector: D,
    identifier: I,
    recognizer: FaceRecognizer,
}

impl<D, I> FacePipeline<D, I>
where
    D: FaceDetector,
    I: FaceIdentifier<Frame = D::Frame>,
{
    pub fn new(detector: D, identifier: I, recognizer: FaceRecognizer) -> Self {
        Self {
            detector,
            identifier,
            recognizer,
        }
    }

    pub fn recognizer(&self) -> &FaceRecognizer {
        &self.recognizer
    }

    /// 検出に失敗した場合はトラッカーを更新せずにエラーを返す
    pub fn process_frame(&mut self, frame: &D::Frame) -> Result<(Vec<FaceObservation>, Vec<LockEvent>), DetectorError> {
        let faces = self.detector.detect(frame)?;
        let identifier = &mut self.identifier;
        Ok(self.recognizer.process(&faces, |bbox| identifier.identify(frame, bbox)))
    }
}
