use crate::domain::model::{DateRange, DocketRecord, ProceedingRef, StatusRecord};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 時間來源，測試時可換成模擬時鐘
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// 對外請求的描述，`service` 是限速與日誌用的服務鍵
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub service: String,
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn get(service: &str, url: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            method: HttpMethod::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(service: &str, url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            body: Some(body),
            method: HttpMethod::Post,
            ..Self::get(service, url)
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// 單次傳輸失敗（尚未套用重試策略）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Other(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// TTABVue 卷宗來源
#[async_trait]
pub trait DocketSource: Send + Sync {
    async fn fetch_docket(&self, proceeding_number: &str) -> Result<DocketRecord>;
    async fn search_party(&self, party_name: &str, range: &DateRange) -> Result<Vec<ProceedingRef>>;
    async fn search_url(&self, url: &str, range: &DateRange) -> Result<Vec<ProceedingRef>>;
}

/// TSDR 狀態來源
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, serial_number: &str) -> Result<StatusRecord>;
}

/// 影像分類模型；回傳未經信任的自由文字
#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn describe_image(&self, image_ref: &str, instruction: &str) -> Result<String>;
}
