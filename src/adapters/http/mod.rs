pub mod rate_limiter;
pub mod retry_client;
pub mod transport;

pub use rate_limiter::{RateLimiter, TokioClock};
pub use retry_client::{HttpRetryClient, RetryPolicy};
pub use transport::ReqwestTransport;
