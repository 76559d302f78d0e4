use crate::adapters::http::HttpRetryClient;
use crate::adapters::ttabvue::parse::parse_date;
use crate::domain::model::StatusRecord;
use crate::domain::ports::{HttpRequest, StatusSource};
use crate::utils::error::{PipelineError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;

pub const SERVICE: &str = "tsdr";

pub const DEFAULT_STATUS_URL: &str = "https://tsdrapi.uspto.gov/ts/cd/casestatus/sn{serial}/info.json";
pub const DEFAULT_IMAGE_URL: &str = "https://tsdrapi.uspto.gov/ts/cd/rawImage/{serial}";

// TSDR info.json 只取用到的欄位，其餘忽略
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StatusDocument {
    trademarks: Vec<TrademarkEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TrademarkEntry {
    status: StatusSection,
    gs_list: Vec<GoodsServices>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StatusSection {
    mark_element: Option<String>,
    filing_date: Option<String>,
    desc_of_mark: Option<String>,
    #[serde(alias = "markDrawingCd")]
    mark_drawing_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GoodsServices {
    us_classes: Vec<ClassEntry>,
    international_classes: Vec<ClassEntry>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClassEntry {
    code: Option<ClassCode>,
}

/// 類別代碼有時是字串（"009"、"A"）有時是數字
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassCode {
    Number(u64),
    Text(String),
}

impl std::fmt::Display for ClassCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassCode::Number(n) => write!(f, "{}", n),
            ClassCode::Text(text) => write!(f, "{}", text.trim()),
        }
    }
}

impl ClassCode {
    fn as_class(&self) -> Option<u16> {
        match self {
            ClassCode::Number(n) => u16::try_from(*n).ok(),
            ClassCode::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// 依類別代碼拆成數字類別與無法解析的代碼（例如服務標章的 "A"、"B"）
fn class_set(entries: &[ClassEntry]) -> (BTreeSet<u16>, Vec<String>) {
    let mut classes = BTreeSet::new();
    let mut skipped = Vec::new();
    for code in entries.iter().filter_map(|entry| entry.code.as_ref()) {
        match code.as_class() {
            Some(class) => {
                classes.insert(class);
            }
            None => skipped.push(code.to_string()),
        }
    }
    (classes, skipped)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn parse_status_date(text: &str) -> Option<NaiveDate> {
    let date_part = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_date(text))
}

/// 標準字元 (4xxx) 與無圖樣 (6xxx) 的申請案沒有可分類的圖片
fn has_drawing(drawing_code: Option<&str>) -> bool {
    match drawing_code.map(str::trim) {
        Some(code) => !(code.starts_with('4') || code.starts_with('6')),
        None => true,
    }
}

/// 將 TSDR 回應轉成 StatusRecord
pub fn parse_status(serial_number: &str, body: &str, image_url_template: &str) -> Result<StatusRecord> {
    let document: StatusDocument = serde_json::from_str(body)
        .map_err(|e| PipelineError::parse(SERVICE, format!("serial {}: {}", serial_number, e)))?;

    let Some(entry) = document.trademarks.into_iter().next() else {
        return Err(PipelineError::not_found(format!("serial {}", serial_number)));
    };

    let mut us_classes = BTreeSet::new();
    let mut international_classes = BTreeSet::new();
    let mut descriptions = Vec::new();
    let mut skipped = Vec::new();
    for gs in &entry.gs_list {
        let (us, us_skipped) = class_set(&gs.us_classes);
        let (international, international_skipped) = class_set(&gs.international_classes);
        us_classes.extend(us);
        international_classes.extend(international);
        skipped.extend(us_skipped);
        skipped.extend(international_skipped);
        if let Some(description) = non_empty(gs.description.clone()) {
            descriptions.push(description);
        }
    }

    if !skipped.is_empty() {
        tracing::debug!(
            serial = serial_number,
            codes = %skipped.join(", "),
            "🏷️ Skipping non-numeric class codes"
        );
    }

    let status = entry.status;
    let image_ref = has_drawing(status.mark_drawing_code.as_deref())
        .then(|| image_url_template.replace("{serial}", serial_number));

    Ok(StatusRecord {
        mark_text: non_empty(status.mark_element),
        us_classes,
        international_classes,
        goods_services: (!descriptions.is_empty()).then(|| descriptions.join(" | ")),
        mark_description: non_empty(status.desc_of_mark),
        filing_date: status.filing_date.as_deref().and_then(parse_status_date),
        image_ref,
    })
}

/// TSDR 狀態來源
pub struct StatusFetcher {
    http: Arc<HttpRetryClient>,
    status_url: String,
    image_url: String,
    api_key: Option<String>,
}

impl StatusFetcher {
    pub fn new(http: Arc<HttpRetryClient>) -> Self {
        Self {
            http,
            status_url: DEFAULT_STATUS_URL.to_string(),
            image_url: DEFAULT_IMAGE_URL.to_string(),
            api_key: None,
        }
    }

    pub fn with_urls(mut self, status_url: impl Into<String>, image_url: impl Into<String>) -> Self {
        self.status_url = status_url.into();
        self.image_url = image_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.is_empty());
        self
    }
}

#[async_trait]
impl StatusSource for StatusFetcher {
    async fn fetch_status(&self, serial_number: &str) -> Result<StatusRecord> {
        let url = self.status_url.replace("{serial}", serial_number);
        let mut request = HttpRequest::get(SERVICE, url);
        if let Some(key) = &self.api_key {
            request = request.header("USPTO-API-KEY", key);
        }

        tracing::debug!(serial = serial_number, "📥 Fetching TSDR status");
        let response = self.http.call(&request).await?;
        let record = parse_status(serial_number, &response.text(), &self.image_url)?;
        tracing::debug!(
            serial = serial_number,
            us_classes = record.us_classes.len(),
            international_classes = record.international_classes.len(),
            "📄 Status parsed"
        );
        Ok(record)
    }
}
