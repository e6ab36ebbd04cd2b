use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub fall: FallConfig,
    #[serde(default)]
    pub face: FaceConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub medicine: MedicineConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default)]
    pub index: i32,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
}

fn default_camera_width() -> u32 { 640 }
fn default_camera_height() -> u32 { 480 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: default_camera_width(),
            height: default_camera_height(),
        }
    }
}

/// 転倒検知のパラメータ
#[derive(Debug, Deserialize, Clone)]
pub struct FallConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// YOLOv8-pose ONNXモデル
    #[serde(default = "default_pose_model")]
    pub model_path: String,
    #[serde(default = "default_pose_input_size")]
    pub input_size: i32,
    /// 人物検出の信頼度閾値
    #[serde(default = "default_detection_confidence")]
    pub detection_confidence: f32,
    /// 転倒確定に必要な連続リスクフレーム数
    #[serde(default = "default_confirm_frames")]
    pub confirm_frames: u32,
    /// これを超えると警告表示
    #[serde(default = "default_warning_frames")]
    pub warning_frames: u32,
    #[serde(default = "default_height_drop")]
    pub height_drop_threshold: f32,
    /// 形状に関係なく転倒とみなす落差
    #[serde(default = "default_extreme_drop")]
    pub extreme_drop_threshold: f32,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio_threshold: f32,
    /// 胴体傾斜角（度）
    #[serde(default = "default_angle")]
    pub angle_threshold_deg: f32,
    #[serde(default = "default_keypoint_confidence")]
    pub keypoint_confidence: f32,
    /// 身長履歴の最大サンプル数
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    #[serde(default = "default_percentile")]
    pub reference_percentile: f32,
    #[serde(default = "default_match_distance")]
    pub match_distance: f32,
    #[serde(default)]
    pub max_missing_frames: u32,
}

fn default_true() -> bool { true }
fn default_pose_model() -> String { "models/yolov8n-pose.onnx".to_string() }
fn default_pose_input_size() -> i32 { 640 }
fn default_detection_confidence() -> f32 { 0.5 }
fn default_confirm_frames() -> u32 { 5 }
fn default_warning_frames() -> u32 { 2 }
fn default_height_drop() -> f32 { 0.65 }
fn default_extreme_drop() -> f32 { 0.5 }
fn default_aspect_ratio() -> f32 { 1.1 }
fn default_angle() -> f32 { 45.0 }
fn default_keypoint_confidence() -> f32 { 0.5 }
fn default_history_len() -> usize { 150 }
fn default_percentile() -> f32 { 90.0 }
fn default_match_distance() -> f32 { 100.0 }

impl Default for FallConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_path: default_pose_model(),
            input_size: default_pose_input_size(),
            detection_confidence: default_detection_confidence(),
            confirm_frames: default_confirm_frames(),
            warning_frames: default_warning_frames(),
            height_drop_threshold: default_height_drop(),
            extreme_drop_threshold: default_extreme_drop(),
            aspect_ratio_threshold: default_aspect_ratio(),
            angle_threshold_deg: default_angle(),
            keypoint_confidence: default_keypoint_confidence(),
            history_len: default_history_len(),
            reference_percentile: default_percentile(),
            match_distance: default_match_distance(),
            max_missing_frames: 0,
        }
    }
}

/// 顔認識のパラメータ
#[derive(Debug, Deserialize, Clone)]
pub struct FaceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Haar cascade XML
    #[serde(default = "default_cascade")]
    pub cascade_path: String,
    /// 顔埋め込みONNXモデル
    #[serde(default = "default_embedding_model")]
    pub model_path: String,
    /// 登録済み顔画像のディレクトリ（ファイル名 = 人名）
    #[serde(default = "default_face_db")]
    pub db_path: PathBuf,
    #[serde(default = "default_confirm_frames")]
    pub confirm_frames: u32,
    #[serde(default = "default_match_distance")]
    pub match_distance: f32,
    /// 同じ顔を再識別するまでのフレーム間隔
    #[serde(default = "default_identify_interval")]
    pub identify_interval_frames: u64,
    /// コサイン類似度の下限
    #[serde(default = "default_similarity")]
    pub similarity_threshold: f32,
    #[serde(default = "default_min_face_size")]
    pub min_face_size: i32,
    #[serde(default)]
    pub max_missing_frames: u32,
}

fn default_cascade() -> String { "models/haarcascade_frontalface_default.xml".to_string() }
fn default_embedding_model() -> String { "models/arcface.onnx".to_string() }
fn default_face_db() -> PathBuf { PathBuf::from("data/face_db") }
fn default_identify_interval() -> u64 { 30 }
fn default_similarity() -> f32 { 0.45 }
fn default_min_face_size() -> i32 { 30 }

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cascade_path: default_cascade(),
            model_path: default_embedding_model(),
            db_path: default_face_db(),
            confirm_frames: default_confirm_frames(),
            match_distance: default_match_distance(),
            identify_interval_frames: default_identify_interval(),
            similarity_threshold: default_similarity(),
            min_face_size: default_min_face_size(),
            max_missing_frames: 0,
        }
    }
}

/// 転倒通知（LINE + imgbb）
#[derive(Debug, Deserialize, Clone)]
pub struct AlertConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 同一人物への再通知までの秒数
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
    #[serde(default = "default_push_timeout")]
    pub push_timeout_secs: u64,
    /// スナップショットの一時保存先
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
    #[serde(default)]
    pub imgbb_api_key: String,
    #[serde(default)]
    pub line_access_token: String,
    #[serde(default)]
    pub line_user_id: String,
    #[serde(default = "default_imgbb_url")]
    pub imgbb_url: String,
    #[serde(default = "default_line_url")]
    pub line_push_url: String,
}

fn default_cooldown() -> u64 { 30 }
fn default_queue_capacity() -> usize { 16 }
fn default_upload_timeout() -> u64 { 15 }
fn default_push_timeout() -> u64 { 10 }
fn default_snapshot_dir() -> PathBuf { PathBuf::from("snapshots") }
fn default_imgbb_url() -> String { "https://api.imgbb.com/1/upload".to_string() }
fn default_line_url() -> String { "https://api.line.me/v2/bot/message/push".to_string() }

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: default_cooldown(),
            queue_capacity: default_queue_capacity(),
            upload_timeout_secs: default_upload_timeout(),
            push_timeout_secs: default_push_timeout(),
            snapshot_dir: default_snapshot_dir(),
            imgbb_api_key: String::new(),
            line_access_token: String::new(),
            line_user_id: String::new(),
            imgbb_url: default_imgbb_url(),
            line_push_url: default_line_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MedicineConfig {
    #[serde(default = "default_medicine_data")]
    pub data_path: PathBuf,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

fn default_medicine_data() -> PathBuf { PathBuf::from("data/medicine_data.json") }
fn default_check_interval() -> u64 { 20 }

impl Default for MedicineConfig {
    fn default() -> Self {
        Self {
            data_path: default_medicine_data(),
            check_interval_secs: default_check_interval(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DebugConfig {
    /// OpenCVウィンドウで検出結果を表示
    #[serde(default)]
    pub view: bool,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 読み込みに失敗した場合はデフォルト設定
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.as_ref().display(), error = %e, "using default config");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.fall.confirm_frames, 5);
        assert_eq!(config.fall.history_len, 150);
        assert!((config.fall.height_drop_threshold - 0.65).abs() < 1e-6);
        assert_eq!(config.face.match_distance, 100.0);
        assert_eq!(config.alert.cooldown_secs, 30);
        assert_eq!(config.medicine.check_interval_secs, 20);
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [fall]
            confirm_frames = 8

            [alert]
            line_user_id = "U123"
            "#,
        )
        .unwrap();
        assert_eq!(config.fall.confirm_frames, 8);
        assert_eq!(config.fall.aspect_ratio_threshold, 1.1);
        assert_eq!(config.alert.line_user_id, "U123");
        assert_eq!(config.camera.width, 640);
    }

    #[test]
    fn test_bundled_config_parses() {
        let config: Config = toml::from_str(include_str!("../config.toml")).unwrap();
        assert_eq!(config.fall.max_missing_frames, 0);
        assert_eq!(config.face.db_path, PathBuf::from("data/face_db"));
        assert!(config.alert.line_access_token.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("does/not/exist.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        let config = Config::load_or_default("does/not/exist.toml");
        assert_eq!(config.face.identify_interval_frames, 30);
    }
}
