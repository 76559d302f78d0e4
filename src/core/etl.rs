use crate::core::batch::BatchRunner;
use crate::domain::model::{BatchResult, DateRange};
use crate::domain::ports::Storage;
use crate::report::{ReportFormat, ReportWriter};
use crate::utils::error::Result;

/// 批次的輸入來源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchInput {
    Proceedings(Vec<String>),
    Party { name: String, range: DateRange },
    SearchUrl { url: String, range: DateRange },
}

#[derive(Debug)]
pub struct EtlOutcome {
    pub result: BatchResult,
    pub files: Vec<String>,
}

/// 擷取（批次）→ 輸出（報表）
pub struct EtlEngine<S: Storage> {
    runner: BatchRunner,
    writer: ReportWriter<S>,
    formats: Vec<ReportFormat>,
}

impl<S: Storage> EtlEngine<S> {
    pub fn new(runner: BatchRunner, writer: ReportWriter<S>, formats: Vec<ReportFormat>) -> Self {
        Self {
            runner,
            writer,
            formats,
        }
    }

    pub async fn run(&self, input: &BatchInput) -> Result<EtlOutcome> {
        tracing::info!("🚀 Starting opposition ETL");

        let result = match input {
            BatchInput::Proceedings(ids) => self.runner.run_ids(ids).await,
            BatchInput::Party { name, range } => self.runner.run_party(name, *range).await,
            BatchInput::SearchUrl { url, range } => self.runner.run_url(url, *range).await,
        };
        tracing::info!(
            cases = result.cases().count(),
            failed = result.failures().count(),
            errors = result.errors.len(),
            "📊 Extracted batch"
        );

        let files = self.writer.write(&result, &self.formats).await?;
        tracing::info!("✅ ETL complete, {} files written", files.len());

        Ok(EtlOutcome { result, files })
    }
}
