//! Per-entity evidence accumulation.
//!
//! - [`LabelVote`]: identity vote with a terminal lock. A disagreeing
//!   observation only drains the counter; the label flips once the counter
//!   is back at zero.
//! - [`FallEvidence`]: saturating fall counter with a non-terminal fall state
//!   and the bounded height history used as the standing baseline.

use std::collections::VecDeque;

use super::entity::EntityId;

/// 未識別ラベル。このラベルではロックしない
pub const UNKNOWN_LABEL: &str = "unknown";

/// ラベルがロックされた時に一度だけ発行されるイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEvent {
    pub entity_id: EntityId,
    pub label: String,
}

/// ヒステリシス付きのラベル投票
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVote {
    label: String,
    confidence_count: u32,
    locked: bool,
}

impl LabelVote {
    pub fn new() -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            confidence_count: 0,
            locked: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn confidence_count(&self) -> u32 {
        self.confidence_count
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// 観測ラベルを1票として反映する。この呼び出しでロックした場合のみtrue
    pub fn observe(&mut self, observed: &str, confirm_frames: u32) -> bool {
        if self.locked {
            return false;
        }

        if observed == self.label {
            self.confidence_count = self.confidence_count.saturating_add(1);
        } else {
            self.confidence_count = self.confidence_count.saturating_sub(1);
            if self.confidence_count == 0 {
                self.label = observed.to_string();
            }
        }

        if self.confidence_count >= confirm_frames && self.label != UNKNOWN_LABEL {
            self.locked = true;
            return true;
        }
        false
    }
}

impl Default for LabelVote {
    fn default() -> Self {
        Self::new()
    }
}

/// 転倒判定の表示状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallStatus {
    Normal,
    Warning,
    Fallen,
}

impl FallStatus {
    pub fn label(&self) -> &'static str {
        match self {
            FallStatus::Normal => "Normal",
            FallStatus::Warning => "Warning...",
            FallStatus::Fallen => "FALL DETECTED!",
        }
    }
}

/// 転倒のヒステリシスカウンタと身長履歴
#[derive(Debug, Clone)]
pub struct FallEvidence {
    fall_state: bool,
    fall_counter: u32,
    height_history: VecDeque<f32>,
    history_cap: usize,
}

impl FallEvidence {
    pub fn new(history_cap: usize) -> Self {
        Self {
            fall_state: false,
            fall_counter: 0,
            height_history: VecDeque::with_capacity(history_cap),
            history_cap,
        }
    }

    pub fn fall_state(&self) -> bool {
        self.fall_state
    }

    pub fn fall_counter(&self) -> u32 {
        self.fall_counter
    }

    pub fn height_history(&self) -> &VecDeque<f32> {
        &self.height_history
    }

    /// 履歴に身長を追加。上限を超えたら古いものから捨てる
    pub fn push_height(&mut self, height: f32) {
        if self.history_cap == 0 {
            return;
        }
        while self.height_history.len() >= self.history_cap {
            self.height_history.pop_front();
        }
        self.height_history.push_back(height);
    }

    /// 1フレーム分の転倒リスクを反映して状態を返す
    pub fn record(&mut self, falling: bool, confirm_frames: u32, warning_frames: u32) -> FallStatus {
        if falling {
            self.fall_counter = self.fall_counter.saturating_add(1);
        } else {
            self.fall_counter = self.fall_counter.saturating_sub(1);
        }

        self.fall_state = self.fall_counter >= confirm_frames;
        if self.fall_state {
            FallStatus::Fallen
        } else if self.fall_counter > warning_frames {
            FallStatus::Warning
        } else {
            FallStatus::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_adopts_label() {
        let mut vote = LabelVote::new();
        assert!(!vote.observe("Alice", 5));
        assert_eq!(vote.label(), "Alice");
        assert_eq!(vote.confidence_count(), 0);
    }

    #[test]
    fn test_lock_after_consecutive_matches() {
        let mut vote = LabelVote::new();
        // 1回目でラベル採用（count=0）、以降5回の一致でロック
        for _ in 0..5 {
            assert!(!vote.observe("Alice", 5));
        }
        assert!(!vote.is_locked());
        assert_eq!(vote.confidence_count(), 4);

        assert!(vote.observe("Alice", 5));
        assert!(vote.is_locked());
        assert_eq!(vote.label(), "Alice");
        assert_eq!(vote.confidence_count(), 5);
    }

    #[test]
    fn test_mismatch_resets_progress() {
        let mut vote = LabelVote::new();
        vote.observe("Alice", 5);
        vote.observe("Alice", 5);
        assert_eq!(vote.confidence_count(), 1);

        vote.observe("Bob", 5);
        assert_eq!(vote.label(), "Bob");
        assert_eq!(vote.confidence_count(), 0);

        for _ in 0..4 {
            vote.observe("Bob", 5);
        }
        assert!(!vote.is_locked());
        assert!(vote.observe("Bob", 5));
        assert_eq!(vote.label(), "Bob");
    }

    #[test]
    fn test_single_mismatch_is_tolerated() {
        let mut vote = LabelVote::new();
        for _ in 0..4 {
            vote.observe("Alice", 5);
        }
        assert_eq!(vote.confidence_count(), 3);

        vote.observe("Bob", 5);
        assert_eq!(vote.label(), "Alice");
        assert_eq!(vote.confidence_count(), 2);
    }

    #[test]
    fn test_unknown_never_locks() {
        let mut vote = LabelVote::new();
        for _ in 0..20 {
            assert!(!vote.observe(UNKNOWN_LABEL, 5));
        }
        assert!(!vote.is_locked());
        assert_eq!(vote.confidence_count(), 20);
    }

    #[test]
    fn test_locked_is_frozen() {
        let mut vote = LabelVote::new();
        for _ in 0..6 {
            vote.observe("Alice", 5);
        }
        assert!(vote.is_locked());
        let before = vote.clone();

        assert!(!vote.observe("Bob", 5));
        assert!(!vote.observe("Alice", 5));
        assert_eq!(vote, before);
    }

    #[test]
    fn test_fall_confirm_after_five_frames() {
        let mut fall = FallEvidence::new(150);
        let statuses: Vec<_> = (0..5).map(|_| fall.record(true, 5, 2)).collect();
        assert_eq!(
            statuses,
            vec![
                FallStatus::Normal,
                FallStatus::Normal,
                FallStatus::Warning,
                FallStatus::Warning,
                FallStatus::Fallen,
            ]
        );
        assert!(fall.fall_state());
    }

    #[test]
    fn test_fall_state_decays_below_threshold() {
        let mut fall = FallEvidence::new(150);
        for _ in 0..6 {
            fall.record(true, 5, 2);
        }
        assert_eq!(fall.fall_counter(), 6);

        // 6 -> 5: まだ転倒状態
        assert_eq!(fall.record(false, 5, 2), FallStatus::Fallen);
        assert!(fall.fall_state());

        // 5 -> 4: 閾値を下回って解除
        assert_eq!(fall.record(false, 5, 2), FallStatus::Warning);
        assert!(!fall.fall_state());
    }

    #[test]
    fn test_fall_counter_floor() {
        let mut fall = FallEvidence::new(150);
        assert_eq!(fall.record(false, 5, 2), FallStatus::Normal);
        assert_eq!(fall.fall_counter(), 0);
    }

    #[test]
    fn test_height_history_bounded() {
        let mut fall = FallEvidence::new(3);
        for h in [1.0, 2.0, 3.0, 4.0, 5.0] {
            fall.push_height(h);
        }
        let heights: Vec<f32> = fall.height_history().iter().copied().collect();
        assert_eq!(heights, vec![3.0, 4.0, 5.0]);
    }
}
