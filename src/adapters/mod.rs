// Adapters layer: concrete implementations for external systems (http, ttabvue, tsdr, vision, storage)

pub mod http;
pub mod storage;
pub mod tsdr;
pub mod ttabvue;
pub mod vision;

pub use storage::LocalStorage;
pub use tsdr::StatusFetcher;
pub use ttabvue::DocketFetcher;
pub use vision::AnthropicVisionClient;
