use crate::adapters::http::HttpRetryClient;
use crate::domain::ports::{HttpRequest, VisionClient};
use crate::utils::error::{PipelineError, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub const SERVICE: &str = "vision";

pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const API_VERSION: &str = "2023-06-01";
/// 圖檔從 TSDR 下載，與狀態查詢共用限速鍵
const IMAGE_SERVICE: &str = crate::adapters::tsdr::SERVICE;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

/// 依檔頭判斷圖片格式；TIFF 模型不支援，無法辨識時當作 JPEG
pub fn sniff_media_type(bytes: &[u8]) -> Result<&'static str> {
    if bytes.is_empty() {
        return Err(PipelineError::ClassificationUnavailable {
            message: "drawing image is empty".to_string(),
        });
    }
    let media_type = if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        "image/gif"
    } else if bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(b"WEBP".as_slice()) {
        "image/webp"
    } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        return Err(PipelineError::ClassificationUnavailable {
            message: "drawing image is TIFF, which the vision model does not accept".to_string(),
        });
    } else {
        "image/jpeg"
    };
    Ok(media_type)
}

/// Messages API 形式的影像描述服務；圖片先經 TSDR 下載再以 base64 傳送
pub struct AnthropicVisionClient {
    http: Arc<HttpRetryClient>,
    endpoint: String,
    model: String,
    max_tokens: u32,
    api_key: String,
    image_api_key: Option<String>,
}

impl AnthropicVisionClient {
    pub fn new(http: Arc<HttpRetryClient>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 20,
            api_key: api_key.into(),
            image_api_key: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>, max_tokens: u32) -> Self {
        self.model = model.into();
        self.max_tokens = max_tokens;
        self
    }

    /// 下載圖檔時帶的 `USPTO-API-KEY`
    pub fn with_image_api_key(mut self, api_key: Option<String>) -> Self {
        self.image_api_key = api_key.filter(|key| !key.is_empty());
        self
    }

    async fn download_image(&self, image_ref: &str) -> Result<(&'static str, String)> {
        let mut request = HttpRequest::get(IMAGE_SERVICE, image_ref);
        if let Some(key) = &self.image_api_key {
            request = request.header("USPTO-API-KEY", key);
        }

        let response = self
            .http
            .call(&request)
            .await
            .map_err(|e| PipelineError::ClassificationUnavailable {
                message: format!("drawing download failed: {}", e),
            })?;
        let media_type = sniff_media_type(&response.body)?;
        tracing::debug!(image_ref, media_type, bytes = response.body.len(), "🖼️ Drawing downloaded");
        Ok((media_type, STANDARD.encode(&response.body)))
    }

    fn request_body(&self, media_type: &str, data: &str, instruction: &str) -> serde_json::Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "image", "source": {"type": "base64", "media_type": media_type, "data": data}},
                    {"type": "text", "text": instruction}
                ]
            }]
        })
    }
}

#[async_trait]
impl VisionClient for AnthropicVisionClient {
    async fn describe_image(&self, image_ref: &str, instruction: &str) -> Result<String> {
        let (media_type, data) = self.download_image(image_ref).await?;
        let request = HttpRequest::post_json(SERVICE, &self.endpoint, self.request_body(media_type, &data, instruction))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION);

        let response = self
            .http
            .call(&request)
            .await
            .map_err(|e| PipelineError::ClassificationUnavailable {
                message: e.to_string(),
            })?;

        let message: MessageResponse =
            response
                .json()
                .map_err(|e| PipelineError::ClassificationUnavailable {
                    message: format!("unreadable vision response: {}", e),
                })?;

        let text = message
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join(" ");

        if text.trim().is_empty() {
            return Err(PipelineError::ClassificationUnavailable {
                message: "vision response contained no text".to_string(),
            });
        }
        Ok(text)
    }
}
