pub mod alert;
pub mod camera;
pub mod config;
pub mod error;
pub mod face;
pub mod fall;
pub mod medicine;
pub mod pose;
#[cfg(feature = "desktop")]
pub mod render;
pub mod tracking;
