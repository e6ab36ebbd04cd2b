pub mod bbox;
pub mod entity;
pub mod evidence;
pub mod tracker;

pub use bbox::BoundingBox;
pub use entity::{EntityId, TrackedEntity};
pub use evidence::{FallEvidence, FallStatus, LabelVote, LockEvent, UNKNOWN_LABEL};
pub use tracker::{EntityTracker, TrackerConfig};
