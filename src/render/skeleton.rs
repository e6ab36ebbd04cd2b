use opencv::{
    core::{Mat, Point, Scalar},
    imgproc,
};

use crate::pose::{KeypointIndex, Pose};

/// 骨格の接続定義 (開始キーポイント, 終了キーポイント)
pub const SKELETON_CONNECTIONS: [(KeypointIndex, KeypointIndex); 16] = [
    // 顔
    (KeypointIndex::LeftEar, KeypointIndex::LeftEye),
    (KeypointIndex::LeftEye, KeypointIndex::Nose),
    (KeypointIndex::Nose, KeypointIndex::RightEye),
    (KeypointIndex::RightEye, KeypointIndex::RightEar),
    // 上半身
    (KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder),
    (KeypointIndex::LeftShoulder, KeypointIndex::LeftElbow),
    (KeypointIndex::LeftElbow, KeypointIndex::LeftWrist),
    (KeypointIndex::RightShoulder, KeypointIndex::RightElbow),
    (KeypointIndex::RightElbow, KeypointIndex::RightWrist),
    // 胴体
    (KeypointIndex::LeftShoulder, KeypointIndex::LeftHip),
    (KeypointIndex::RightShoulder, KeypointIndex::RightHip),
    (KeypointIndex::LeftHip, KeypointIndex::RightHip),
    // 下半身
    (KeypointIndex::LeftHip, KeypointIndex::LeftKnee),
    (KeypointIndex::LeftKnee, KeypointIndex::LeftAnkle),
    (KeypointIndex::RightHip, KeypointIndex::RightKnee),
    (KeypointIndex::RightKnee, KeypointIndex::RightAnkle),
];

/// 骨格線の色 (BGR)
fn skeleton_color() -> Scalar {
    Scalar::new(0.0, 255.0, 255.0, 0.0) // 黄色
}

/// キーポイントの色 (BGR)
fn keypoint_color() -> Scalar {
    Scalar::new(0.0, 255.0, 0.0, 0.0) // 緑
}

/// 信頼度が閾値を超えるキーポイントと接続線を描画
pub fn draw_skeleton(frame: &mut Mat, pose: &Pose, confidence: f32) -> opencv::Result<()> {
    for (a, b) in SKELETON_CONNECTIONS {
        let ka = pose.get(a);
        let kb = pose.get(b);
        if !ka.is_confident(confidence) || !kb.is_confident(confidence) {
            continue;
        }
        imgproc::line(
            frame,
            Point::new(ka.x as i32, ka.y as i32),
            Point::new(kb.x as i32, kb.y as i32),
            skeleton_color(),
            2,
            imgproc::LINE_AA,
            0,
        )?;
    }

    for kp in pose.keypoints.iter().filter(|kp| kp.is_confident(confidence)) {
        imgproc::circle(
            frame,
            Point::new(kp.x as i32, kp.y as i32),
            3,
            keypoint_color(),
            -1,
            imgproc::LINE_AA,
            0,
        )?;
    }
    Ok(())
}
