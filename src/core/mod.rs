pub mod aggregator;
pub mod batch;
pub mod classifier;
pub mod etl;
pub mod summary;

pub use aggregator::OppositionAggregator;
pub use batch::BatchRunner;
pub use classifier::MarkClassifier;
pub use etl::{BatchInput, EtlEngine, EtlOutcome};
pub use summary::CaseSummary;
pub use crate::domain::ports::Storage;
pub use crate::utils::error::Result;
