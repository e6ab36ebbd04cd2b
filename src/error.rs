use std::path::PathBuf;

use thiserror::Error;

/// 検出器（姿勢推定・顔検出・顔識別）の呼び出し境界で発生するエラー
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("invalid model output: {0}")]
    InvalidOutput(String),

    #[error("image processing failed: {0}")]
    Image(String),
}

/// 通知バックエンドのエラー
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("unexpected response ({status}): {body}")]
    Response { status: u16, body: String },

    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
}

/// 薬データストアのエラー
#[derive(Debug, Error)]
pub enum MedicineError {
    #[error("name and time are required")]
    MissingField,

    #[error("invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("medicine '{0}' already exists")]
    Duplicate(String),

    #[error("medicine {0} not found")]
    NotFound(u32),

    #[error("no medicine id left after {0}")]
    IdExhausted(u32),

    #[error("failed to save {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode medicine data: {0}")]
    Encode(#[from] serde_json::Error),
}

/// 設定ファイルの読み込みエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
