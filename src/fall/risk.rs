use crate::config::FallConfig;
use crate::pose::{KeypointIndex, Pose};
use crate::tracking::{BoundingBox, FallEvidence};

/// 1検出分の転倒リスク
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskSignal {
    /// 現在の高さ / 基準高さ
    pub drop_ratio: f32,
    /// 幅 / 高さ
    pub aspect_ratio: f32,
    /// 胴体の鉛直からの傾き（度）。肩・腰が見えない場合None
    pub torso_angle: Option<f32>,
    pub height_risk: bool,
    pub aspect_risk: bool,
    pub angle_risk: bool,
    /// このフレームで転倒中とみなすか
    pub falling: bool,
}

/// 矩形と骨格の幾何ヒューリスティックによる転倒リスク評価
#[derive(Debug, Clone)]
pub struct FallRiskEvaluator {
    height_drop_threshold: f32,
    extreme_drop_threshold: f32,
    aspect_ratio_threshold: f32,
    angle_threshold_deg: f32,
    keypoint_confidence: f32,
    reference_percentile: f32,
}

impl FallRiskEvaluator {
    pub fn from_config(config: &FallConfig) -> Self {
        Self {
            height_drop_threshold: config.height_drop_threshold,
            extreme_drop_threshold: config.extreme_drop_threshold,
            aspect_ratio_threshold: config.aspect_ratio_threshold,
            angle_threshold_deg: config.angle_threshold_deg,
            keypoint_confidence: config.keypoint_confidence,
            reference_percentile: config.reference_percentile,
        }
    }

    /// リスクを評価する
    ///
    /// 転倒確定中でなければ現在の高さを履歴に追加してから基準高さを計算する。
    /// 転倒中の低い高さで基準が汚れるのを防ぐため。
    pub fn evaluate(&self, evidence: &mut FallEvidence, bbox: &BoundingBox, pose: Option<&Pose>) -> RiskSignal {
        let height = bbox.height;
        if !evidence.fall_state() {
            evidence.push_height(height);
        }

        let reference = percentile(evidence.height_history().iter().copied(), self.reference_percentile)
            .unwrap_or(height);
        let drop_ratio = if reference > 0.0 { height / reference } else { 1.0 };
        let aspect_ratio = bbox.aspect_ratio();
        let torso_angle = pose.and_then(|p| torso_angle(p, self.keypoint_confidence));

        let height_risk = drop_ratio < self.height_drop_threshold;
        let aspect_risk = aspect_ratio > self.aspect_ratio_threshold;
        let angle_risk = torso_angle.is_some_and(|a| a > self.angle_threshold_deg);
        let falling = (height_risk && (aspect_risk || angle_risk)) || drop_ratio < self.extreme_drop_threshold;

        RiskSignal {
            drop_ratio,
            aspect_ratio,
            torso_angle,
            height_risk,
            aspect_risk,
            angle_risk,
            falling,
        }
    }
}

impl Default for FallRiskEvaluator {
    fn default() -> Self {
        Self::from_config(&FallConfig::default())
    }
}

/// 肩中点→腰中点ベクトルの鉛直からの角度（度）
///
/// atan(|dx| / |dy|)。dyが0なら水平とみなし90度。
pub fn torso_angle(pose: &Pose, confidence: f32) -> Option<f32> {
    let shoulder = pose.midpoint(KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder, confidence)?;
    let hip = pose.midpoint(KeypointIndex::LeftHip, KeypointIndex::RightHip, confidence)?;
    let dx = (shoulder.0 - hip.0).abs();
    let dy = (shoulder.1 - hip.1).abs();
    if dy == 0.0 {
        return Some(90.0);
    }
    Some((dx / dy).atan().to_degrees())
}

/// 線形補間によるパーセンタイル（numpy.percentile のデフォルトと同じ）
pub fn percentile<I: IntoIterator<Item = f32>>(values: I, p: f32) -> Option<f32> {
    let mut sorted: Vec<f32> = values.into_iter().collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f32::total_cmp);

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f32;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Keypoint;

    fn upright(height: f32) -> BoundingBox {
        BoundingBox::new(100.0, 100.0, height * 0.4, height)
    }

    fn pose_with_torso(shoulder: (f32, f32), hip: (f32, f32), confidence: f32) -> Pose {
        let mut pose = Pose::default();
        pose.set(KeypointIndex::LeftShoulder, Keypoint::new(shoulder.0 - 10.0, shoulder.1, confidence));
        pose.set(KeypointIndex::RightShoulder, Keypoint::new(shoulder.0 + 10.0, shoulder.1, confidence));
        pose.set(KeypointIndex::LeftHip, Keypoint::new(hip.0 - 10.0, hip.1, confidence));
        pose.set(KeypointIndex::RightHip, Keypoint::new(hip.0 + 10.0, hip.1, confidence));
        pose
    }

    #[test]
    fn test_percentile() {
        assert_eq!(percentile(Vec::new(), 90.0), None);
        assert_eq!(percentile(vec![42.0], 90.0), Some(42.0));
        let p = percentile((1..=10).map(|v| v as f32), 90.0).unwrap();
        assert!((p - 9.1).abs() < 1e-5);
        assert_eq!(percentile(vec![100.0, 100.0, 100.0, 100.0, 100.0, 60.0], 90.0), Some(100.0));
    }

    #[test]
    fn test_height_drop_scenario() {
        let evaluator = FallRiskEvaluator::default();
        let mut evidence = FallEvidence::new(150);
        for _ in 0..5 {
            let signal = evaluator.evaluate(&mut evidence, &upright(100.0), None);
            assert!(!signal.height_risk);
        }
        let signal = evaluator.evaluate(&mut evidence, &upright(60.0), None);
        assert!((signal.drop_ratio - 0.6).abs() < 1e-5);
        assert!(signal.height_risk);
        // 縦長の矩形・骨格なし → 形状リスクなし、0.5未満でもない
        assert!(!signal.falling);
    }

    #[test]
    fn test_height_and_aspect_risk_is_falling() {
        let evaluator = FallRiskEvaluator::default();
        let mut evidence = FallEvidence::new(150);
        for _ in 0..5 {
            evaluator.evaluate(&mut evidence, &upright(100.0), None);
        }
        let lying = BoundingBox::new(100.0, 100.0, 90.0, 60.0);
        let signal = evaluator.evaluate(&mut evidence, &lying, None);
        assert!(signal.height_risk);
        assert!(signal.aspect_risk);
        assert!(signal.falling);
    }

    #[test]
    fn test_extreme_drop_overrides_shape() {
        let evaluator = FallRiskEvaluator::default();
        let mut evidence = FallEvidence::new(150);
        for _ in 0..9 {
            evaluator.evaluate(&mut evidence, &upright(100.0), None);
        }
        let signal = evaluator.evaluate(&mut evidence, &upright(40.0), None);
        assert!(!signal.aspect_risk);
        assert!(signal.drop_ratio < 0.5);
        assert!(signal.falling);
    }

    #[test]
    fn test_empty_history_uses_current_height() {
        let evaluator = FallRiskEvaluator::default();
        let mut evidence = FallEvidence::new(150);
        let signal = evaluator.evaluate(&mut evidence, &upright(80.0), None);
        assert!((signal.drop_ratio - 1.0).abs() < 1e-6);
        assert_eq!(evidence.height_history().len(), 1);
    }

    #[test]
    fn test_history_frozen_while_fallen() {
        let evaluator = FallRiskEvaluator::default();
        let mut evidence = FallEvidence::new(150);
        for _ in 0..5 {
            evidence.record(true, 5, 2);
        }
        assert!(evidence.fall_state());
        evaluator.evaluate(&mut evidence, &upright(30.0), None);
        assert!(evidence.height_history().is_empty());
    }

    #[test]
    fn test_torso_angle() {
        let vertical = pose_with_torso((100.0, 50.0), (100.0, 150.0), 0.9);
        assert!((torso_angle(&vertical, 0.5).unwrap()).abs() < 1e-5);

        let diagonal = pose_with_torso((100.0, 100.0), (200.0, 200.0), 0.9);
        assert!((torso_angle(&diagonal, 0.5).unwrap() - 45.0).abs() < 1e-4);

        let flat = pose_with_torso((100.0, 100.0), (200.0, 100.0), 0.9);
        assert_eq!(torso_angle(&flat, 0.5), Some(90.0));

        let weak = pose_with_torso((100.0, 100.0), (200.0, 100.0), 0.5);
        assert_eq!(torso_angle(&weak, 0.5), None);
    }

    #[test]
    fn test_angle_risk_with_height_drop() {
        let evaluator = FallRiskEvaluator::default();
        let mut evidence = FallEvidence::new(150);
        for _ in 0..5 {
            evaluator.evaluate(&mut evidence, &upright(100.0), None);
        }
        // 縦長の矩形だが胴体はほぼ水平
        let bbox = BoundingBox::new(100.0, 100.0, 55.0, 60.0);
        let pose = pose_with_torso((100.0, 120.0), (150.0, 130.0), 0.9);
        let signal = evaluator.evaluate(&mut evidence, &bbox, Some(&pose));
        assert!(!signal.aspect_risk);
        assert!(signal.angle_risk);
        assert!(signal.falling);
    }
}
