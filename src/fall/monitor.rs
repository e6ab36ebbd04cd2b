use crate::alert::AlertSink;
use crate::config::FallConfig;
use crate::error::DetectorError;
use crate::pose::{PersonDetection, Pose, PoseEstimator};
use crate::tracking::{BoundingBox, EntityId, EntityTracker, FallStatus, TrackerConfig};

use super::risk::{FallRiskEvaluator, RiskSignal};

/// 1人分の転倒判定結果（描画・ログ用）
#[derive(Debug, Clone)]
pub struct FallObservation {
    pub entity_id: EntityId,
    pub bbox: BoundingBox,
    pub pose: Option<Pose>,
    pub signal: RiskSignal,
    pub status: FallStatus,
}

/// 人物トラッキング + 転倒リスク + ヒステリシス
pub struct FallMonitor {
    tracker: EntityTracker,
    evaluator: FallRiskEvaluator,
    confirm_frames: u32,
    warning_frames: u32,
}

impl FallMonitor {
    pub fn from_config(config: &FallConfig) -> Self {
        Self {
            tracker: EntityTracker::new(TrackerConfig {
                match_distance: config.match_distance,
                max_missing_frames: config.max_missing_frames,
                history_len: config.history_len,
            }),
            evaluator: FallRiskEvaluator::from_config(config),
            confirm_frames: config.confirm_frames,
            warning_frames: config.warning_frames,
        }
    }

    pub fn tracker(&self) -> &EntityTracker {
        &self.tracker
    }

    /// 1フレーム分の検出を処理する
    ///
    /// 転倒確定中のエンティティは毎フレーム `alerts` に通知する（頻度制御は通知側のクールダウン）。
    /// `snapshot` は通知が必要になった時に一度だけ呼ばれる。
    pub fn process<F>(
        &mut self,
        detections: &[PersonDetection],
        alerts: &dyn AlertSink,
        snapshot: F,
    ) -> Vec<FallObservation>
    where
        F: FnOnce() -> Option<Vec<u8>>,
    {
        let boxes: Vec<BoundingBox> = detections.iter().map(|d| d.bbox).collect();
        let ids = self.tracker.match_detections(&boxes);

        let mut snapshot = Some(snapshot);
        let mut encoded: Option<Vec<u8>> = None;
        let mut observations = Vec::with_capacity(detections.len());

        for (detection, id) in detections.iter().zip(ids) {
            let Some(entity) = self.tracker.get_mut(id) else {
                continue;
            };
            let was_fallen = entity.fall.fall_state();
            let signal = self
                .evaluator
                .evaluate(&mut entity.fall, &detection.bbox, detection.pose.as_ref());
            let status = entity
                .fall
                .record(signal.falling, self.confirm_frames, self.warning_frames);

            if status == FallStatus::Fallen {
                if !was_fallen {
                    tracing::warn!(
                        entity = %id,
                        drop_ratio = signal.drop_ratio,
                        aspect_ratio = signal.aspect_ratio,
                        "fall confirmed"
                    );
                }
                if encoded.is_none() {
                    encoded = snapshot.take().and_then(|f| f());
                }
                alerts.notify(id, encoded.clone().unwrap_or_default(), signal.drop_ratio);
            } else if was_fallen {
                tracing::info!(entity = %id, "fall state cleared");
            }

            observations.push(FallObservation {
                entity_id: id,
                bbox: detection.bbox,
                pose: detection.pose.clone(),
                signal,
                status,
            });
        }

        observations
    }
}

/// 姿勢推定器と転倒モニタの組
pub struct FallDetector<E: PoseEstimator> {
    estimator: E,
    monitor: FallMonitor,
}

impl<E: PoseEstimator> FallDetector<E> {
    pub fn new(estimator: E, monitor: FallMonitor) -> Self {
        Self { estimator, monitor }
    }

    pub fn monitor(&self) -> &FallMonitor {
        &self.monitor
    }

    /// 推定に失敗した場合はトラッカーを更新せずにエラーを返す
    pub fn process_frame<F>(
        &mut self,
        frame: &E::Frame,
        alerts: &dyn AlertSink,
        encode: F,
    ) -> Result<Vec<FallObservation>, DetectorError>
    where
        F: FnOnce(&E::Frame) -> Option<Vec<u8>>,
    {
        let detections = self.estimator.estimate(frame)?;
        Ok(self.monitor.process(&detections, alerts, || encode(frame)))
    }
}
