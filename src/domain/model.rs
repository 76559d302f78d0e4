use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::utils::error::PipelineError;

/// 異議案件的判決結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseResult {
    Sustained,
    Dismissed,
    Pending,
    Unknown,
}

impl CaseResult {
    /// 報表用代碼：1 = 成立，0 = 駁回
    pub fn code(&self) -> Option<u8> {
        match self {
            Self::Sustained => Some(1),
            Self::Dismissed => Some(0),
            Self::Pending | Self::Unknown => None,
        }
    }

    pub fn is_decisive(&self) -> bool {
        matches!(self, Self::Sustained | Self::Dismissed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkType {
    StandardText,
    StylizedDesign,
    Slogan,
    Unknown,
}

impl MarkType {
    /// 報表用的商標類型編號 (1 標準文字, 2 設計/圖樣, 3 標語, 0 未知)
    pub fn code(&self) -> u8 {
        match self {
            Self::StandardText => 1,
            Self::StylizedDesign => 2,
            Self::Slogan => 3,
            Self::Unknown => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    ModelClassified,
    FallbackDefault,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    Plaintiff,
    Defendant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStage {
    Docket,
    Search,
    Status,
    Classification,
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    NotFound,
    ParseError,
    RateLimited,
    ExhaustedRetries,
    Rejected,
    ClassificationUnavailable,
    Aborted,
    Internal,
}

/// 單一階段的失敗紀錄，附掛在案件/商標上或列入批次錯誤日誌
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchError {
    pub proceeding: Option<String>,
    pub serial_number: Option<String>,
    pub stage: FetchStage,
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(stage: FetchStage, kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            proceeding: None,
            serial_number: None,
            stage,
            kind,
            message: message.into(),
        }
    }

    pub fn from_error(stage: FetchStage, error: &PipelineError) -> Self {
        Self::new(stage, error.kind(), error.to_string())
    }

    pub fn for_proceeding(mut self, proceeding: &str) -> Self {
        self.proceeding = Some(proceeding.to_string());
        self
    }

    pub fn for_serial(mut self, serial_number: &str) -> Self {
        self.serial_number = Some(serial_number.to_string());
        self
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}/{:?}]", self.stage, self.kind)?;
        if let Some(proceeding) = &self.proceeding {
            write!(f, " proceeding {}", proceeding)?;
        }
        if let Some(serial) = &self.serial_number {
            write!(f, " serial {}", serial)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// 案件中列出的一個商標申請案
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkRecord {
    pub serial_number: String,
    pub mark_name: Option<String>,
    pub owner: Option<PartyRole>,
    pub us_classes: BTreeSet<u16>,
    pub international_classes: BTreeSet<u16>,
    pub goods_services: Option<String>,
    pub mark_description: Option<String>,
    pub filing_date: Option<NaiveDate>,
    pub image_ref: Option<String>,
    pub mark_type: MarkType,
    pub classification_source: ClassificationSource,
    pub errors: Vec<FetchError>,
}

impl MarkRecord {
    /// 只帶卷宗欄位的初始紀錄，其餘欄位保持預設值
    pub fn from_pleaded(pleaded: &PleadedMark) -> Self {
        Self {
            serial_number: pleaded.serial_number.clone(),
            mark_name: pleaded.mark_name.clone(),
            owner: pleaded.owner,
            us_classes: BTreeSet::new(),
            international_classes: BTreeSet::new(),
            goods_services: None,
            mark_description: None,
            filing_date: None,
            image_ref: None,
            mark_type: MarkType::Unknown,
            classification_source: ClassificationSource::Unavailable,
            errors: Vec::new(),
        }
    }

    pub fn apply_status(&mut self, status: StatusRecord) {
        self.us_classes = status.us_classes;
        self.international_classes = status.international_classes;
        self.goods_services = status.goods_services;
        self.mark_description = status.mark_description;
        self.filing_date = status.filing_date;
        self.image_ref = status.image_ref;
        if status.mark_text.is_some() {
            self.mark_name = status.mark_text;
        }
    }

    pub fn apply_classification(&mut self, mark_type: MarkType, source: ClassificationSource) {
        self.mark_type = mark_type;
        self.classification_source = source;
    }

    /// 可作為文字分類依據的商標文字（排除佔位字串）
    pub fn text_sample(&self) -> Option<&str> {
        self.mark_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case("unknown"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OppositionCase {
    pub proceeding_number: String,
    pub plaintiffs: Vec<String>,
    pub defendants: Vec<String>,
    pub filing_date: Option<NaiveDate>,
    pub termination_date: Option<NaiveDate>,
    pub last_action_date: Option<NaiveDate>,
    pub result: CaseResult,
    pub marks: Vec<MarkRecord>,
}

impl OppositionCase {
    pub fn unique_us_classes(&self) -> BTreeSet<u16> {
        self.marks
            .iter()
            .flat_map(|mark| mark.us_classes.iter().copied())
            .collect()
    }

    pub fn unique_international_classes(&self) -> BTreeSet<u16> {
        self.marks
            .iter()
            .flat_map(|mark| mark.international_classes.iter().copied())
            .collect()
    }

    pub fn errors(&self) -> impl Iterator<Item = &FetchError> {
        self.marks.iter().flat_map(|mark| mark.errors.iter())
    }

    pub fn role_of(&self, party: &str) -> Option<PartyRole> {
        let needle = party.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        let matches = |names: &[String]| {
            names
                .iter()
                .any(|name| name.to_lowercase().contains(&needle))
        };
        if matches(&self.plaintiffs) {
            Some(PartyRole::Plaintiff)
        } else if matches(&self.defendants) {
            Some(PartyRole::Defendant)
        } else {
            None
        }
    }
}

/// 卷宗頁解析出的商標參照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PleadedMark {
    pub serial_number: String,
    pub mark_name: Option<String>,
    pub owner: Option<PartyRole>,
}

/// 卷宗來源回傳的案件骨架（尚未合併狀態資料）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocketRecord {
    pub proceeding_number: String,
    pub plaintiffs: Vec<String>,
    pub defendants: Vec<String>,
    pub filing_date: Option<NaiveDate>,
    pub termination_date: Option<NaiveDate>,
    pub last_action_date: Option<NaiveDate>,
    pub result: CaseResult,
    pub marks: Vec<PleadedMark>,
}

/// 狀態 API 對單一序號的正規化結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusRecord {
    pub mark_text: Option<String>,
    pub us_classes: BTreeSet<u16>,
    pub international_classes: BTreeSet<u16>,
    pub goods_services: Option<String>,
    pub mark_description: Option<String>,
    pub filing_date: Option<NaiveDate>,
    pub image_ref: Option<String>,
}

/// 搜尋結果中的一筆程序
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProceedingRef {
    pub number: String,
    pub proceeding_type: Option<String>,
    pub filing_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// 無日期的項目只有在沒有設定範圍時才納入
    pub fn admits(&self, date: Option<NaiveDate>) -> bool {
        match date {
            None => self.is_unbounded(),
            Some(date) => {
                self.start.map_or(true, |start| date >= start)
                    && self.end.map_or(true, |end| date <= end)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BatchSource {
    Proceedings,
    Party { name: String, range: DateRange },
    SearchUrl { url: String, range: DateRange },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchItem {
    Case(OppositionCase),
    Failed(FetchError),
}

/// 一次批次執行的唯一輸出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub source: BatchSource,
    pub items: Vec<BatchItem>,
    pub errors: Vec<FetchError>,
    pub aborted: bool,
}

impl BatchResult {
    pub fn empty(source: BatchSource) -> Self {
        Self {
            source,
            items: Vec::new(),
            errors: Vec::new(),
            aborted: false,
        }
    }

    pub fn cases(&self) -> impl Iterator<Item = &OppositionCase> {
        self.items.iter().filter_map(|item| match item {
            BatchItem::Case(case) => Some(case),
            BatchItem::Failed(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &FetchError> {
        self.items.iter().filter_map(|item| match item {
            BatchItem::Failed(error) => Some(error),
            BatchItem::Case(_) => None,
        })
    }

    pub fn searched_party(&self) -> Option<&str> {
        match &self.source {
            BatchSource::Party { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub last_error: Option<String>,
}
