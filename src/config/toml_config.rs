use crate::adapters::http::{HttpRetryClient, RateLimiter, ReqwestTransport, RetryPolicy, TokioClock};
use crate::adapters::{AnthropicVisionClient, DocketFetcher, LocalStorage, StatusFetcher};
use crate::core::{BatchRunner, EtlEngine, MarkClassifier, OppositionAggregator};
use crate::domain::ports::VisionClient;
use crate::domain::result_rules::ResultRules;
use crate::report::{ReportFormat, ReportWriter};
use crate::utils::error::{PipelineError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sources: SourcesConfig,
    pub credentials: CredentialsConfig,
    pub http: HttpConfig,
    pub rate_limit: RateLimitConfig,
    pub batch: BatchConfig,
    pub vision: VisionConfig,
    pub result_rules: Option<ResultRules>,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub ttabvue_url: String,
    pub tsdr_status_url: String,
    pub tsdr_image_url: String,
    pub proceeding_type: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            ttabvue_url: "https://ttabvue.uspto.gov/ttabvue/v".to_string(),
            tsdr_status_url: crate::adapters::tsdr::DEFAULT_STATUS_URL.to_string(),
            tsdr_image_url: crate::adapters::tsdr::DEFAULT_IMAGE_URL.to_string(),
            proceeding_type: "OPP".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub uspto_api_key: Option<String>,
    pub vision_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub jitter: bool,
    pub max_concurrent_requests: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 20,
            max_retries: 3,
            backoff_base_ms: 1000,
            jitter: true,
            max_concurrent_requests: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub interval_ms: u64,
    /// 依服務名稱 (ttabvue / tsdr / vision) 覆寫的間隔
    pub services: HashMap<String, u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            interval_ms: 750,
            services: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_concurrent_cases: usize,
    pub timeout_seconds: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_cases: 2,
            timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: crate::adapters::vision::DEFAULT_ENDPOINT.to_string(),
            model: crate::adapters::vision::DEFAULT_MODEL.to_string(),
            max_tokens: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: String,
    pub file_prefix: String,
    pub formats: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "./output".to_string(),
            file_prefix: "opposition_report".to_string(),
            formats: vec!["json".to_string(), "csv".to_string()],
        }
    }
}

/// 未被環境變數取代的 `${VAR}` 視為未設定
fn resolved(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.contains("${"))
        .map(str::to_string)
}

impl AppConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(PipelineError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| PipelineError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${USPTO_API_KEY})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| PipelineError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url("sources.ttabvue_url", &self.sources.ttabvue_url)?;
        validation::validate_template("sources.tsdr_status_url", &self.sources.tsdr_status_url, "{serial}")?;
        validation::validate_template("sources.tsdr_image_url", &self.sources.tsdr_image_url, "{serial}")?;
        validation::validate_non_empty_string("sources.proceeding_type", &self.sources.proceeding_type)?;

        validation::validate_range("http.timeout_seconds", self.http.timeout_seconds, 1, 300)?;
        validation::validate_range("http.max_retries", self.http.max_retries, 0, 10)?;
        validation::validate_positive_number(
            "http.max_concurrent_requests",
            self.http.max_concurrent_requests,
            1,
        )?;
        validation::validate_positive_number(
            "batch.max_concurrent_cases",
            self.batch.max_concurrent_cases,
            1,
        )?;
        if let Some(timeout) = self.batch.timeout_seconds {
            validation::validate_positive_number("batch.timeout_seconds", timeout as usize, 1)?;
        }

        if self.vision_api_key().is_some() {
            validation::validate_url("vision.endpoint", &self.vision.endpoint)?;
            validation::validate_non_empty_string("vision.model", &self.vision.model)?;
        }

        validation::validate_path("output.directory", &self.output.directory)?;
        validation::validate_non_empty_string("output.file_prefix", &self.output.file_prefix)?;
        if self.output.formats.is_empty() {
            return Err(PipelineError::MissingConfigError {
                field: "output.formats".to_string(),
            });
        }
        self.report_formats()?;

        Ok(())
    }

    pub fn uspto_api_key(&self) -> Option<String> {
        resolved(&self.credentials.uspto_api_key)
    }

    pub fn vision_api_key(&self) -> Option<String> {
        resolved(&self.credentials.vision_api_key)
    }

    pub fn report_formats(&self) -> Result<Vec<ReportFormat>> {
        let mut formats = Vec::new();
        for value in &self.output.formats {
            let format: ReportFormat = value.parse()?;
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        Ok(formats)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(self.http.timeout_seconds),
            max_retries: self.http.max_retries,
            backoff_base: Duration::from_millis(self.http.backoff_base_ms),
            jitter: self.http.jitter,
        }
    }

    pub fn batch_deadline(&self) -> Option<Duration> {
        self.batch.timeout_seconds.map(Duration::from_secs)
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        let mut limiter = RateLimiter::new(
            Duration::from_millis(self.rate_limit.interval_ms),
            Arc::new(TokioClock),
        );
        for (service, interval_ms) in &self.rate_limit.services {
            limiter = limiter.with_service_interval(service, Duration::from_millis(*interval_ms));
        }
        limiter
    }

    /// 組出共用一個限速器與重試客戶端的批次執行器
    pub fn build_runner(&self) -> BatchRunner {
        let http = Arc::new(HttpRetryClient::new(
            Arc::new(ReqwestTransport::new()),
            Arc::new(self.rate_limiter()),
            self.retry_policy(),
            self.http.max_concurrent_requests,
        ));

        let docket = DocketFetcher::new(http.clone(), &self.sources.ttabvue_url)
            .with_proceeding_type(&self.sources.proceeding_type)
            .with_rules(self.result_rules.clone().unwrap_or_default());
        let status = StatusFetcher::new(http.clone())
            .with_urls(&self.sources.tsdr_status_url, &self.sources.tsdr_image_url)
            .with_api_key(self.uspto_api_key());

        let vision: Option<Arc<dyn VisionClient>> = self.vision_api_key().map(|key| {
            let client = AnthropicVisionClient::new(http.clone(), key)
                .with_endpoint(&self.vision.endpoint)
                .with_model(&self.vision.model, self.vision.max_tokens)
                .with_image_api_key(self.uspto_api_key());
            Arc::new(client) as Arc<dyn VisionClient>
        });
        if vision.is_none() {
            tracing::info!("🔤 No vision API key configured, classifying by mark text only");
        }

        let aggregator = OppositionAggregator::new(
            Arc::new(docket),
            Arc::new(status),
            Arc::new(MarkClassifier::new(vision)),
        );
        BatchRunner::new(Arc::new(aggregator), self.batch.max_concurrent_cases)
            .with_deadline(self.batch_deadline())
    }

    pub fn build_engine(&self) -> Result<EtlEngine<LocalStorage>> {
        let writer = ReportWriter::new(
            LocalStorage::new(&self.output.directory),
            &self.output.file_prefix,
        );
        Ok(EtlEngine::new(self.build_runner(), writer, self.report_formats()?))
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::CaseResult;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.http.max_retries, 3);
        assert_eq!(config.rate_limit.interval_ms, 750);
        assert_eq!(config.sources.proceeding_type, "OPP");
        assert_eq!(
            config.report_formats().unwrap(),
            vec![ReportFormat::Json, ReportFormat::Csv]
        );
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[sources]
ttabvue_url = "http://localhost:9000/ttabvue/v"
tsdr_status_url = "http://localhost:9000/sn{serial}/info.json"
tsdr_image_url = "http://localhost:9000/img/{serial}"

[http]
timeout_seconds = 5
max_retries = 1
backoff_base_ms = 10
jitter = false

[rate_limit]
interval_ms = 100

[rate_limit.services]
tsdr = 250

[batch]
max_concurrent_cases = 3
timeout_seconds = 600

[[result_rules.rules]]
pattern = "OPPOSITION SUSTAINED"
result = "sustained"

[output]
directory = "./reports"
formats = ["tsv", "json", "tsv"]
"#;
        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.retry_policy().max_retries, 1);
        assert!(!config.retry_policy().jitter);
        assert_eq!(config.batch_deadline(), Some(Duration::from_secs(600)));
        assert_eq!(
            config.rate_limiter().interval_for("tsdr"),
            Duration::from_millis(250)
        );
        assert_eq!(
            config.rate_limiter().interval_for("ttabvue"),
            Duration::from_millis(100)
        );
        let rules = config.result_rules.clone().unwrap();
        assert_eq!(rules.rules.len(), 1);
        assert_eq!(rules.normalize("opposition sustained"), CaseResult::Sustained);
        assert_eq!(
            config.report_formats().unwrap(),
            vec![ReportFormat::Tsv, ReportFormat::Json]
        );
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("OPPOSITION_ETL_TEST_KEY", "secret-123");
        let toml_content = r#"
[credentials]
uspto_api_key = "${OPPOSITION_ETL_TEST_KEY}"
vision_api_key = "${OPPOSITION_ETL_UNSET_KEY}"
"#;
        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.uspto_api_key().as_deref(), Some("secret-123"));
        assert_eq!(config.vision_api_key(), None);
        std::env::remove_var("OPPOSITION_ETL_TEST_KEY");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let bad_format = AppConfig::from_toml_str("[output]\nformats = [\"xlsx\"]").unwrap();
        assert!(matches!(
            bad_format.validate(),
            Err(PipelineError::InvalidConfigValueError { .. })
        ));

        let bad_url = AppConfig::from_toml_str("[sources]\nttabvue_url = \"ftp://x\"").unwrap();
        assert!(bad_url.validate().is_err());

        let no_placeholder =
            AppConfig::from_toml_str("[sources]\ntsdr_status_url = \"https://x/info.json\"").unwrap();
        assert!(no_placeholder.validate().is_err());

        let zero_workers = AppConfig::from_toml_str("[batch]\nmax_concurrent_cases = 0").unwrap();
        assert!(zero_workers.validate().is_err());

        assert!(AppConfig::from_toml_str("[http]\nmax_retries = \"many\"").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[batch]\nmax_concurrent_cases = 5").unwrap();
        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.batch.max_concurrent_cases, 5);

        assert!(matches!(
            AppConfig::from_file("/nonexistent/opposition.toml"),
            Err(PipelineError::IoError(_))
        ));
    }
}
