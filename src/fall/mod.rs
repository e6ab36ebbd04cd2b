pub mod monitor;
pub mod risk;

pub use monitor::{FallDetector, FallMonitor, FallObservation};
pub use risk::{percentile, torso_angle, FallRiskEvaluator, RiskSignal};
