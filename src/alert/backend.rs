//! Alert delivery backends: image host upload + push message.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::AlertConfig;
use crate::error::AlertError;

/// 通知の送り先
#[async_trait]
pub trait AlertBackend: Send + Sync {
    fn name(&self) -> &str;

    /// 画像を添付できるか。falseならスナップショットの保存・アップロードを省略する
    fn supports_images(&self) -> bool {
        true
    }

    /// 画像をアップロードして公開URLを返す
    async fn upload_image(&self, path: &Path) -> Result<String, AlertError>;

    /// テキスト（と任意の画像URL）をプッシュ送信
    async fn push_message(&self, text: &str, image_url: Option<&str>) -> Result<(), AlertError>;
}

/// LINE Messaging API push + imgbb アップロード
pub struct LineBackend {
    client: Client,
    imgbb_url: String,
    imgbb_api_key: String,
    push_url: String,
    access_token: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct ImgbbResponse {
    data: ImgbbData,
}

#[derive(Debug, Deserialize)]
struct ImgbbData {
    url: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PushRequest {
    pub to: String,
    pub messages: Vec<LineMessage>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LineMessage {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "originalContentUrl")]
        original_content_url: String,
        #[serde(rename = "previewImageUrl")]
        preview_image_url: String,
    },
}

/// テキスト + 任意の画像からなるpushリクエスト本体
pub fn build_push_request(user_id: &str, text: &str, image_url: Option<&str>) -> PushRequest {
    let mut messages = vec![LineMessage::Text {
        text: text.to_string(),
    }];
    if let Some(url) = image_url {
        messages.push(LineMessage::Image {
            original_content_url: url.to_string(),
            preview_image_url: url.to_string(),
        });
    }
    PushRequest {
        to: user_id.to_string(),
        messages,
    }
}

impl LineBackend {
    pub fn from_config(config: &AlertConfig) -> Result<Self, AlertError> {
        let timeout = Duration::from_secs(config.upload_timeout_secs.max(config.push_timeout_secs));
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            imgbb_url: config.imgbb_url.clone(),
            imgbb_api_key: config.imgbb_api_key.clone(),
            push_url: config.line_push_url.clone(),
            access_token: config.line_access_token.clone(),
            user_id: config.line_user_id.clone(),
        })
    }

    /// 認証情報が揃っているか
    pub fn is_configured(config: &AlertConfig) -> bool {
        !config.line_access_token.is_empty() && !config.line_user_id.is_empty()
    }
}

#[async_trait]
impl AlertBackend for LineBackend {
    fn name(&self) -> &str {
        "line"
    }

    fn supports_images(&self) -> bool {
        !self.imgbb_api_key.is_empty()
    }

    async fn upload_image(&self, path: &Path) -> Result<String, AlertError> {
        let bytes = tokio::fs::read(path).await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);

        let response = self
            .client
            .post(&self.imgbb_url)
            .form(&[("key", self.imgbb_api_key.as_str()), ("image", encoded.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AlertError::Response {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ImgbbResponse = response.json().await?;
        Ok(parsed.data.url)
    }

    async fn push_message(&self, text: &str, image_url: Option<&str>) -> Result<(), AlertError> {
        let request = build_push_request(&self.user_id, text, image_url);
        let response = self
            .client
            .post(&self.push_url)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AlertError::Response {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// 送信先が未設定の場合のログ出力のみのバックエンド
pub struct LogBackend;

#[async_trait]
impl AlertBackend for LogBackend {
    fn name(&self) -> &str {
        "log"
    }

    fn supports_images(&self) -> bool {
        false
    }

    async fn upload_image(&self, path: &Path) -> Result<String, AlertError> {
        Ok(path.display().to_string())
    }

    async fn push_message(&self, text: &str, _image_url: Option<&str>) -> Result<(), AlertError> {
        tracing::warn!(backend = "log", text, "alert");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_request_text_only() {
        let req = build_push_request("U1", "hello", None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "to": "U1",
                "messages": [{"type": "text", "text": "hello"}]
            })
        );
    }

    #[test]
    fn test_push_request_with_image() {
        let req = build_push_request("U1", "fall", Some("https://i.ibb.co/x.jpg"));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json["messages"][1],
            serde_json::json!({
                "type": "image",
                "originalContentUrl": "https://i.ibb.co/x.jpg",
                "previewImageUrl": "https://i.ibb.co/x.jpg"
            })
        );
    }

    #[test]
    fn test_is_configured() {
        let mut config = AlertConfig::default();
        assert!(!LineBackend::is_configured(&config));
        config.line_access_token = "token".to_string();
        config.line_user_id = "U1".to_string();
        assert!(LineBackend::is_configured(&config));
    }

    #[test]
    fn test_imgbb_response_parse() {
        let parsed: ImgbbResponse =
            serde_json::from_str(r#"{"data": {"url": "https://i.ibb.co/abc.jpg", "id": "abc"}, "success": true}"#)
                .unwrap();
        assert_eq!(parsed.data.url, "https://i.ibb.co/abc.jpg");
    }
}
