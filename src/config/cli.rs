use crate::config::toml_config::AppConfig;
use crate::core::BatchInput;
use crate::domain::model::DateRange;
use crate::utils::error::{PipelineError, Result};
use crate::utils::validation::validate_proceeding_number;
use chrono::NaiveDate;
use clap::Parser;

fn parse_us_date(value: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%m/%d/%Y")
        .map_err(|e| format!("expected MM/DD/YYYY ({})", e))
}

#[derive(Debug, Clone, Parser)]
#[command(name = "opposition-etl")]
#[command(about = "Collect USPTO trademark opposition cases into structured reports")]
pub struct CliArgs {
    /// Opposition proceeding numbers (e.g. 91234567)
    pub proceedings: Vec<String>,

    /// Resolve proceedings by party name instead of listing numbers
    #[arg(long, conflicts_with_all = ["proceedings", "search_url"])]
    pub party: Option<String>,

    /// Read proceedings from a TTABVue search results URL
    #[arg(long, conflicts_with = "proceedings")]
    pub search_url: Option<String>,

    /// Only keep proceedings filed on or after this date (MM/DD/YYYY)
    #[arg(long, value_parser = parse_us_date)]
    pub from: Option<NaiveDate>,

    /// Only keep proceedings filed on or before this date (MM/DD/YYYY)
    #[arg(long, value_parser = parse_us_date)]
    pub to: Option<NaiveDate>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the output directory from config
    #[arg(short, long)]
    pub output: Option<String>,

    /// Override report formats (json, csv, tsv)
    #[arg(long, value_delimiter = ',')]
    pub format: Vec<String>,

    /// Abort the whole batch after this many seconds
    #[arg(long)]
    pub batch_timeout: Option<u64>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Dry run - show what would be processed without executing
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    pub fn date_range(&self) -> DateRange {
        DateRange {
            start: self.from,
            end: self.to,
        }
    }

    /// 決定批次來源；程序編號、當事人或搜尋網址三者必須恰有一個
    pub fn batch_input(&self) -> Result<BatchInput> {
        let range = self.date_range();
        if let (Some(start), Some(end)) = (range.start, range.end) {
            if start > end {
                return Err(PipelineError::ConfigValidationError {
                    field: "from/to".to_string(),
                    message: format!("--from {} is after --to {}", start, end),
                });
            }
        }

        match (&self.party, &self.search_url) {
            (Some(name), None) if self.proceedings.is_empty() => {
                crate::utils::validation::validate_non_empty_string("party", name)?;
                Ok(BatchInput::Party {
                    name: name.trim().to_string(),
                    range,
                })
            }
            (None, Some(url)) if self.proceedings.is_empty() => {
                crate::utils::validation::validate_url("search_url", url)?;
                Ok(BatchInput::SearchUrl {
                    url: url.clone(),
                    range,
                })
            }
            (None, None) if !self.proceedings.is_empty() => {
                for number in &self.proceedings {
                    validate_proceeding_number("proceedings", number)?;
                }
                if !range.is_unbounded() {
                    tracing::warn!("⚠️ --from/--to only apply to party and URL searches");
                }
                Ok(BatchInput::Proceedings(self.proceedings.clone()))
            }
            (None, None) => Err(PipelineError::MissingConfigError {
                field: "proceedings, --party or --search-url".to_string(),
            }),
            _ => Err(PipelineError::ConfigValidationError {
                field: "input".to_string(),
                message: "Give either proceeding numbers, --party or --search-url, not several"
                    .to_string(),
            }),
        }
    }

    /// 載入設定檔（未指定時使用預設值）並套用命令列覆寫
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };
        self.apply_overrides(&mut config);
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(output) = &self.output {
            config.output.directory = output.clone();
            tracing::info!("🔧 Output directory overridden to: {}", output);
        }
        if !self.format.is_empty() {
            config.output.formats = self.format.clone();
            tracing::info!("🔧 Report formats overridden to: {}", self.format.join(", "));
        }
        if let Some(timeout) = self.batch_timeout {
            config.batch.timeout_seconds = Some(timeout);
            tracing::info!("🔧 Batch timeout overridden to: {}s", timeout);
        }
    }
}
