use std::fmt;

use super::bbox::BoundingBox;
use super::evidence::{FallEvidence, LabelVote, LockEvent};

/// トラッカー内で一意なエンティティID（生成順に増加）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// フレームを跨いで追跡される対象（人物の体または顔）
#[derive(Debug, Clone)]
pub struct TrackedEntity {
    pub id: EntityId,
    /// 最新の観測矩形
    pub bbox: BoundingBox,
    pub vote: LabelVote,
    pub fall: FallEvidence,
    /// 最後にマッチしてからのフレーム数
    pub missing_streak: u32,
    /// 最後に重い評価（顔識別）を行ったフレーム番号
    pub last_evaluated_frame: Option<u64>,
}

impl TrackedEntity {
    pub fn new(id: EntityId, bbox: BoundingBox, history_cap: usize) -> Self {
        Self {
            id,
            bbox,
            vote: LabelVote::new(),
            fall: FallEvidence::new(history_cap),
            missing_streak: 0,
            last_evaluated_frame: None,
        }
    }

    /// 新しい観測で位置を更新
    pub fn update_position(&mut self, bbox: BoundingBox) {
        self.bbox = bbox;
        self.missing_streak = 0;
    }

    /// ラベル投票。ロックした呼び出しでのみイベントを返す
    pub fn observe_label(&mut self, label: &str, confirm_frames: u32) -> Option<LockEvent> {
        if self.vote.observe(label, confirm_frames) {
            Some(LockEvent {
                entity_id: self.id,
                label: self.vote.label().to_string(),
            })
        } else {
            None
        }
    }

    /// 前回の評価から `interval` フレーム以上経過していれば評価対象
    pub fn evaluation_due(&self, frame_index: u64, interval: u64) -> bool {
        match self.last_evaluated_frame {
            None => true,
            Some(last) => frame_index.saturating_sub(last) >= interval,
        }
    }

    pub fn mark_evaluated(&mut self, frame_index: u64) {
        self.last_evaluated_frame = Some(frame_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity() -> TrackedEntity {
        TrackedEntity::new(EntityId(7), BoundingBox::new(0.0, 0.0, 10.0, 10.0), 150)
    }

    #[test]
    fn test_lock_event_carries_id() {
        let mut e = entity();
        let events: Vec<_> = (0..6).filter_map(|_| e.observe_label("Alice", 5)).collect();
        assert_eq!(
            events,
            vec![LockEvent {
                entity_id: EntityId(7),
                label: "Alice".to_string()
            }]
        );
        assert!(e.observe_label("Alice", 5).is_none());
    }

    #[test]
    fn test_update_position_resets_missing() {
        let mut e = entity();
        e.missing_streak = 3;
        e.update_position(BoundingBox::new(5.0, 5.0, 10.0, 10.0));
        assert_eq!(e.missing_streak, 0);
        assert_eq!(e.bbox.x, 5.0);
    }

    #[test]
    fn test_evaluation_due() {
        let mut e = entity();
        assert!(e.evaluation_due(0, 30));
        e.mark_evaluated(10);
        assert!(!e.evaluation_due(39, 30));
        assert!(e.evaluation_due(40, 30));
    }
}
