pub mod overlay;
pub mod skeleton;

pub use overlay::{draw_face_overlay, draw_fall_overlay, encode_jpeg, PreviewWindow};
pub use skeleton::{draw_skeleton, SKELETON_CONNECTIONS};
