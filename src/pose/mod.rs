#[cfg(feature = "desktop")]
pub mod detector;
pub mod estimator;
pub mod keypoint;
#[cfg(feature = "desktop")]
pub mod preprocess;

#[cfg(feature = "desktop")]
pub use detector::YoloPoseDetector;
pub use estimator::{non_max_suppression, PersonDetection, PoseEstimator};
pub use keypoint::{Keypoint, KeypointIndex, Pose};
#[cfg(feature = "desktop")]
pub use preprocess::{bgr_to_nchw, letterbox_nchw, LetterboxInfo};
