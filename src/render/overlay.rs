use opencv::{
    core::{Mat, Point, Rect, Scalar, Vector},
    highgui, imgcodecs, imgproc,
    prelude::*,
};

use super::skeleton::draw_skeleton;
use crate::face::{FaceObservation, FaceStatus};
use crate::fall::FallObservation;
use crate::tracking::{BoundingBox, FallStatus};

const JPEG_QUALITY: i32 = 85;

fn bgr(b: f64, g: f64, r: f64) -> Scalar {
    Scalar::new(b, g, r, 0.0)
}

fn fall_color(status: FallStatus) -> Scalar {
    match status {
        FallStatus::Normal => bgr(0.0, 255.0, 0.0),
        FallStatus::Warning => bgr(0.0, 165.0, 255.0),
        FallStatus::Fallen => bgr(0.0, 0.0, 255.0),
    }
}

fn face_color(status: &FaceStatus) -> Scalar {
    match status {
        FaceStatus::Locked { .. } => bgr(0.0, 255.0, 0.0),
        FaceStatus::Tentative { .. } => bgr(0.0, 255.0, 255.0),
        FaceStatus::Checking => bgr(0.0, 0.0, 255.0),
    }
}

fn draw_labeled_box(frame: &mut Mat, bbox: &BoundingBox, text: &str, color: Scalar) -> opencv::Result<()> {
    let rect = Rect::new(
        bbox.x as i32,
        bbox.y as i32,
        bbox.width.max(1.0) as i32,
        bbox.height.max(1.0) as i32,
    );
    imgproc::rectangle(frame, rect, color, 2, imgproc::LINE_8, 0)?;
    imgproc::put_text(
        frame,
        text,
        Point::new(rect.x, (rect.y - 10).max(15)),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.6,
        color,
        2,
        imgproc::LINE_8,
        false,
    )
}

/// 人物ごとの矩形・骨格・転倒状態
pub fn draw_fall_overlay(frame: &mut Mat, observations: &[FallObservation], keypoint_confidence: f32) -> opencv::Result<()> {
    for obs in observations {
        if let Some(pose) = &obs.pose {
            draw_skeleton(frame, pose, keypoint_confidence)?;
        }
        let text = format!("ID {}: {}", obs.entity_id, obs.status.label());
        draw_labeled_box(frame, &obs.bbox, &text, fall_color(obs.status))?;
    }
    Ok(())
}

/// 顔ごとの矩形と識別状態
pub fn draw_face_overlay(frame: &mut Mat, observations: &[FaceObservation], confirm_frames: u32) -> opencv::Result<()> {
    for obs in observations {
        draw_labeled_box(frame, &obs.bbox, &obs.status.text(confirm_frames), face_color(&obs.status))?;
    }
    Ok(())
}

/// 通知用のJPEGエンコード。失敗したらNone
pub fn encode_jpeg(frame: &Mat) -> Option<Vec<u8>> {
    let mut buf = Vector::<u8>::new();
    let params = Vector::from_slice(&[imgcodecs::IMWRITE_JPEG_QUALITY, JPEG_QUALITY]);
    match imgcodecs::imencode(".jpg", frame, &mut buf, &params) {
        Ok(true) => Some(buf.to_vec()),
        Ok(false) => {
            tracing::warn!("jpeg encoder rejected frame");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "jpeg encode failed");
            None
        }
    }
}

/// デバッグ表示用ウィンドウ
pub struct PreviewWindow {
    name: String,
}

impl PreviewWindow {
    pub fn new(name: &str) -> opencv::Result<Self> {
        highgui::named_window(name, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self { name: name.to_string() })
    }

    /// 表示して 'q' が押されたらfalse
    pub fn show(&self, frame: &Mat) -> opencv::Result<bool> {
        if frame.empty() {
            return Ok(true);
        }
        highgui::imshow(&self.name, frame)?;
        let key = highgui::wait_key(1)?;
        Ok(key != 'q' as i32)
    }
}

impl Drop for PreviewWindow {
    fn drop(&mut self) {
        if let Err(e) = highgui::destroy_window(&self.name) {
            tracing::debug!(window = %self.name, error = %e, "destroy_window failed");
        }
    }
}
