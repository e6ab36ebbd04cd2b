#[cfg(feature = "desktop")]
pub mod capture;
pub mod frame;

#[cfg(feature = "desktop")]
pub use capture::{OpenCvCamera, ThreadedCamera};
pub use frame::{run_frame_loop, FrameSource, LatestFrame, SharedFrameSource};
