//! 批次結果的報表輸出（JSON 全量、CSV/TSV 表格）。
//!
//! 只讀取 `BatchResult`，不修改任何內容。

use crate::core::summary::CaseSummary;
use crate::domain::model::{
    BatchResult, ClassificationSource, MarkRecord, OppositionCase, PartyRole,
};
use crate::domain::ports::Storage;
use crate::utils::error::{PipelineError, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportFormat {
    Json,
    Csv,
    Tsv,
}

impl ReportFormat {
    pub const ALL: [&'static str; 3] = ["json", "csv", "tsv"];

    fn delimiter(&self) -> Option<u8> {
        match self {
            Self::Json => None,
            Self::Csv => Some(b','),
            Self::Tsv => Some(b'\t'),
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Tsv => "tsv",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            other => Err(PipelineError::InvalidConfigValueError {
                field: "output.formats".to_string(),
                value: other.to_string(),
                reason: format!("Must be one of: {}", Self::ALL.join(", ")),
            }),
        }
    }
}

/// 商標表的一列
#[derive(Debug, Serialize)]
struct MarkRow<'a> {
    proceeding_number: &'a str,
    serial_number: &'a str,
    mark_name: Option<&'a str>,
    owner: Option<&'static str>,
    us_classes: String,
    international_classes: String,
    mark_type: u8,
    classification_source: &'static str,
    filing_date: Option<NaiveDate>,
    image_ref: Option<&'a str>,
    goods_services: Option<&'a str>,
    mark_description: Option<&'a str>,
    errors: String,
}

fn class_list(classes: &BTreeSet<u16>) -> String {
    classes
        .iter()
        .map(|class| format!("{:03}", class))
        .collect::<Vec<_>>()
        .join(", ")
}

impl<'a> MarkRow<'a> {
    fn new(case: &'a OppositionCase, mark: &'a MarkRecord) -> Self {
        Self {
            proceeding_number: &case.proceeding_number,
            serial_number: &mark.serial_number,
            mark_name: mark.mark_name.as_deref(),
            owner: mark.owner.map(|role| match role {
                PartyRole::Plaintiff => "plaintiff",
                PartyRole::Defendant => "defendant",
            }),
            us_classes: class_list(&mark.us_classes),
            international_classes: class_list(&mark.international_classes),
            mark_type: mark.mark_type.code(),
            classification_source: match mark.classification_source {
                ClassificationSource::ModelClassified => "model_classified",
                ClassificationSource::FallbackDefault => "fallback_default",
                ClassificationSource::Unavailable => "unavailable",
            },
            filing_date: mark.filing_date,
            image_ref: mark.image_ref.as_deref(),
            goods_services: mark.goods_services.as_deref(),
            mark_description: mark.mark_description.as_deref(),
            errors: mark
                .errors
                .iter()
                .map(|error| error.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

fn delimited<T: Serialize>(rows: &[T], delimiter: u8) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| PipelineError::IoError(e.into_error()))
}

/// 透過 Storage 寫出報表，回傳寫入的檔名
pub struct ReportWriter<S: Storage> {
    storage: S,
    prefix: String,
}

impl<S: Storage> ReportWriter<S> {
    pub fn new(storage: S, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn summaries(result: &BatchResult) -> Vec<CaseSummary> {
        let party = result.searched_party();
        result
            .cases()
            .map(|case| CaseSummary::from_case(case, party))
            .collect()
    }

    pub async fn write(&self, result: &BatchResult, formats: &[ReportFormat]) -> Result<Vec<String>> {
        let mut written = Vec::new();

        for format in formats {
            match format.delimiter() {
                None => {
                    let path = format!("{}.json", self.prefix);
                    let json = serde_json::to_vec_pretty(result)?;
                    self.storage.write_file(&path, &json).await?;
                    written.push(path);
                }
                Some(delimiter) => {
                    let marks: Vec<MarkRow> = result
                        .cases()
                        .flat_map(|case| case.marks.iter().map(move |mark| MarkRow::new(case, mark)))
                        .collect();
                    let tables = [
                        ("marks", delimited(&marks, delimiter)?),
                        ("summary", delimited(&Self::summaries(result), delimiter)?),
                        ("errors", delimited(&result.errors, delimiter)?),
                    ];
                    for (table, data) in tables {
                        let path = format!("{}_{}.{}", self.prefix, table, format.extension());
                        self.storage.write_file(&path, &data).await?;
                        written.push(path);
                    }
                }
            }
        }

        tracing::info!(files = written.len(), "📦 Report written: {}", written.join(", "));
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        BatchItem, BatchSource, CaseResult, FetchError, FetchErrorKind, FetchStage, MarkType,
        PleadedMark,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStorage {
        files: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemoryStorage {
        fn text(&self, path: &str) -> String {
            String::from_utf8(self.files.lock().unwrap()[path].clone()).unwrap()
        }
    }

    impl Storage for MemoryStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| PipelineError::not_found(path))
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    fn sample() -> BatchResult {
        let mut mark = MarkRecord::from_pleaded(&PleadedMark {
            serial_number: "87654321".to_string(),
            mark_name: Some("ACME, INC.".to_string()),
            owner: None,
        });
        mark.us_classes = BTreeSet::from([21, 23]);
        mark.apply_classification(MarkType::StylizedDesign, ClassificationSource::ModelClassified);

        let case = OppositionCase {
            proceeding_number: "91234567".to_string(),
            plaintiffs: vec!["Acme Corp".to_string()],
            defendants: vec![],
            filing_date: None,
            termination_date: None,
            last_action_date: None,
            result: CaseResult::Dismissed,
            marks: vec![mark],
        };
        let failure = FetchError::new(FetchStage::Docket, FetchErrorKind::NotFound, "gone")
            .for_proceeding("91000000");

        BatchResult {
            source: BatchSource::Proceedings,
            items: vec![BatchItem::Case(case), BatchItem::Failed(failure.clone())],
            errors: vec![failure],
            aborted: false,
        }
    }

    #[tokio::test]
    async fn test_csv_tables() {
        let writer = ReportWriter::new(MemoryStorage::default(), "report");
        let written = writer.write(&sample(), &[ReportFormat::Csv]).await.unwrap();

        assert_eq!(
            written,
            vec!["report_marks.csv", "report_summary.csv", "report_errors.csv"]
        );
        let marks = writer.storage().text("report_marks.csv");
        let mut lines = marks.lines();
        assert!(lines.next().unwrap().starts_with("proceeding_number,serial_number,mark_name"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("91234567,87654321,\"ACME, INC.\",,\"021, 023\""));
        assert!(row.contains(",2,model_classified,"));

        let errors = writer.storage().text("report_errors.csv");
        assert!(errors.contains("91000000,,docket,not_found,gone"));
    }

    #[tokio::test]
    async fn test_json_and_tsv() {
        let writer = ReportWriter::new(MemoryStorage::default(), "out");
        writer
            .write(&sample(), &[ReportFormat::Json, ReportFormat::Tsv])
            .await
            .unwrap();

        let json: serde_json::Value = serde_json::from_str(&writer.storage().text("out.json")).unwrap();
        assert_eq!(json["items"][0]["outcome"], "case");
        assert_eq!(json["items"][1]["outcome"], "failed");

        let summary = writer.storage().text("out_summary.tsv");
        assert!(summary.lines().next().unwrap().contains("\tresult_code\t"));
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("TSV".parse::<ReportFormat>().unwrap(), ReportFormat::Tsv);
        assert!("xlsx".parse::<ReportFormat>().is_err());
    }
}
