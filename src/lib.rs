pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod report;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;
pub use config::AppConfig;

pub use adapters::{AnthropicVisionClient, DocketFetcher, LocalStorage, StatusFetcher};
pub use core::{BatchInput, BatchRunner, EtlEngine, MarkClassifier, OppositionAggregator};
pub use domain::model::{BatchItem, BatchResult, MarkRecord, OppositionCase};
pub use utils::error::{PipelineError, Result};
