//! Frame-to-frame association of detections with tracked entities.
//!
//! Association is first-match by center distance in entity creation order,
//! not an optimal assignment: O(entities × detections), deterministic, and an
//! earlier entity wins a tie. An entity takes at most one detection per frame.
//! Entities that received no detection are dropped at the end of the frame
//! unless `max_missing_frames` allows them to linger.

use super::bbox::BoundingBox;
use super::entity::{EntityId, TrackedEntity};

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// 同一エンティティとみなす中心間距離（ピクセル、未満で一致）
    pub match_distance: f32,
    /// 未マッチでも保持するフレーム数。0ならそのフレームで削除
    pub max_missing_frames: u32,
    /// エンティティごとの身長履歴の上限
    pub history_len: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            match_distance: 100.0,
            max_missing_frames: 0,
            history_len: 150,
        }
    }
}

/// サブシステム（顔・転倒）ごとに所有されるエンティティ集合
pub struct EntityTracker {
    config: TrackerConfig,
    entities: Vec<TrackedEntity>,
    next_id: u64,
}

impl EntityTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            entities: Vec::new(),
            next_id: 0,
        }
    }

    fn next_entity_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// 今フレームの検出を既存エンティティに対応付ける
    ///
    /// 戻り値は `detections` と同じ順序のエンティティID。
    pub fn match_detections(&mut self, detections: &[BoundingBox]) -> Vec<EntityId> {
        let mut matched = vec![false; self.entities.len()];
        let mut assigned = Vec::with_capacity(detections.len());

        for detection in detections {
            let hit = self
                .entities
                .iter()
                .enumerate()
                .position(|(i, entity)| {
                    !matched[i] && entity.bbox.center_distance(detection) < self.config.match_distance
                });

            match hit {
                Some(i) => {
                    self.entities[i].update_position(*detection);
                    matched[i] = true;
                    assigned.push(self.entities[i].id);
                }
                None => {
                    let id = self.next_entity_id();
                    self.entities
                        .push(TrackedEntity::new(id, *detection, self.config.history_len));
                    matched.push(true);
                    assigned.push(id);
                }
            }
        }

        let max_missing = self.config.max_missing_frames;
        let mut flags = matched.into_iter();
        self.entities.retain_mut(|entity| {
            if flags.next().unwrap_or(false) {
                return true;
            }
            entity.missing_streak = entity.missing_streak.saturating_add(1);
            let keep = entity.missing_streak <= max_missing;
            if !keep {
                tracing::debug!(entity = %entity.id, label = entity.vote.label(), "entity dropped");
            }
            keep
        });

        assigned
    }

    pub fn get(&self, id: EntityId) -> Option<&TrackedEntity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut TrackedEntity> {
        self.entities.iter_mut().find(|e| e.id == id)
    }

    /// 生存中のエンティティ（生成順）
    pub fn entities(&self) -> &[TrackedEntity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Default for EntityTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
