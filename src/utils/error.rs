use crate::domain::model::FetchErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Unrecognized {source_name} response: {message}")]
    Parse { source_name: String, message: String },

    #[error("Rate limited by {service} after {attempts} attempts")]
    RateLimited { service: String, attempts: u32 },

    #[error("Request to {service} failed after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        service: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Request to {service} rejected with HTTP {status}")]
    Rejected { service: String, status: u16 },

    #[error("Classification unavailable: {message}")]
    ClassificationUnavailable { message: String },

    #[error("Batch aborted: {message}")]
    Aborted { message: String },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Data,
    Classification,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl PipelineError {
    pub fn parse(source_name: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// 對應到紀錄層級的錯誤種類
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::NotFound { .. } => FetchErrorKind::NotFound,
            Self::Parse { .. } | Self::SerializationError(_) => FetchErrorKind::ParseError,
            Self::RateLimited { .. } => FetchErrorKind::RateLimited,
            Self::ExhaustedRetries { .. } => FetchErrorKind::ExhaustedRetries,
            Self::Rejected { .. } => FetchErrorKind::Rejected,
            Self::ClassificationUnavailable { .. } => FetchErrorKind::ClassificationUnavailable,
            Self::Aborted { .. } => FetchErrorKind::Aborted,
            Self::CsvError(_)
            | Self::IoError(_)
            | Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => FetchErrorKind::Internal,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::RateLimited { .. }
            | Self::ExhaustedRetries { .. }
            | Self::Rejected { .. } => ErrorCategory::Network,
            Self::NotFound { .. } | Self::Parse { .. } | Self::SerializationError(_) => {
                ErrorCategory::Data
            }
            Self::ClassificationUnavailable { .. } => ErrorCategory::Classification,
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::Aborted { .. } | Self::CsvError(_) | Self::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ClassificationUnavailable { .. } | Self::NotFound { .. } => ErrorSeverity::Low,
            Self::RateLimited { .. }
            | Self::ExhaustedRetries { .. }
            | Self::Aborted { .. } => ErrorSeverity::Medium,
            Self::Parse { .. }
            | Self::Rejected { .. }
            | Self::SerializationError(_)
            | Self::CsvError(_) => ErrorSeverity::High,
            Self::IoError(_)
            | Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorSeverity::Critical,
        }
    }

    /// 結束程序時使用的退出碼
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "Check the proceeding or serial number",
            Self::Parse { .. } | Self::SerializationError(_) => {
                "The upstream page layout may have changed; inspect the raw response"
            }
            Self::RateLimited { .. } => "Increase rate_limit.interval_ms and retry later",
            Self::ExhaustedRetries { .. } => {
                "Check network connectivity or raise http.max_retries / http.timeout_seconds"
            }
            Self::Rejected { status: 401 | 403, .. } => "Check the USPTO API key",
            Self::Rejected { .. } => "Check the request parameters",
            Self::ClassificationUnavailable { .. } => "Check the vision API key and quota",
            Self::Aborted { .. } => "Raise the batch timeout or process fewer proceedings",
            Self::CsvError(_) | Self::IoError(_) => "Check that the output directory is writable",
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => "Fix the configuration file or CLI arguments",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Could not reach a USPTO service: {}", self),
            ErrorCategory::Data => format!("Unexpected data from USPTO: {}", self),
            ErrorCategory::Classification => format!("Mark classification failed: {}", self),
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_kinds() {
        assert_eq!(
            PipelineError::not_found("serial 1").kind(),
            FetchErrorKind::NotFound
        );
        assert_eq!(
            PipelineError::RateLimited {
                service: "tsdr".to_string(),
                attempts: 4
            }
            .kind(),
            FetchErrorKind::RateLimited
        );
        assert_eq!(
            PipelineError::parse("docket", "no rows").kind(),
            FetchErrorKind::ParseError
        );
    }

    #[test]
    fn test_exit_code_follows_severity() {
        let config = PipelineError::MissingConfigError {
            field: "sources.ttabvue_url".to_string(),
        };
        assert_eq!(config.severity(), ErrorSeverity::Critical);
        assert_eq!(config.exit_code(), 3);

        let aborted = PipelineError::Aborted {
            message: "deadline".to_string(),
        };
        assert_eq!(aborted.exit_code(), 2);
        assert!(aborted.user_friendly_message().starts_with("System error"));
    }
}
