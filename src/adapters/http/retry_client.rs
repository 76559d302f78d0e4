use crate::adapters::http::rate_limiter::RateLimiter;
use crate::domain::ports::{HttpRequest, HttpResponse, Transport};
use crate::utils::error::{PipelineError, Result};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// 重試策略
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// base × 2^attempt，開啟 jitter 時再加上至多 25% 的隨機延遲
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = self.backoff_base.saturating_mul(1u32 << attempt.min(16));
        if !self.jitter {
            return delay;
        }
        let spread = (delay.as_millis() / 4) as u64;
        if spread == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

enum AttemptFailure {
    Timeout,
    Transport(String),
    Status(u16),
}

impl AttemptFailure {
    fn describe(&self) -> String {
        match self {
            Self::Timeout => "request timed out".to_string(),
            Self::Transport(message) => message.clone(),
            Self::Status(status) => format!("HTTP {}", status),
        }
    }
}

/// 所有對外呼叫的唯一出口：全域並行上限、限速、逾時與指數退避重試
pub struct HttpRetryClient {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    permits: Arc<Semaphore>,
}

impl HttpRetryClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
        max_concurrent_requests: usize,
    ) -> Self {
        Self {
            transport,
            limiter,
            policy,
            permits: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
        }
    }

    async fn attempt(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, AttemptFailure> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AttemptFailure::Transport("request pool closed".to_string()))?;
        self.limiter.acquire(&request.service).await;

        match tokio::time::timeout(self.policy.timeout, self.transport.send(request)).await {
            Err(_) => Err(AttemptFailure::Timeout),
            Ok(Err(error)) => Err(AttemptFailure::Transport(error.to_string())),
            Ok(Ok(response)) => Ok(response),
        }
    }

    pub async fn call(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let service = request.service.as_str();
        let attempts = self.policy.max_retries + 1;
        let mut last_failure = AttemptFailure::Timeout;

        for attempt in 0..attempts {
            let failure = match self.attempt(request).await {
                Ok(response) if response.is_success() => {
                    if attempt > 0 {
                        tracing::info!(service, attempt = attempt + 1, "✅ Request succeeded after retry");
                    }
                    return Ok(response);
                }
                Ok(response) if response.status == 404 => {
                    return Err(PipelineError::not_found(request.url.clone()));
                }
                Ok(response) if is_retryable_status(response.status) => {
                    AttemptFailure::Status(response.status)
                }
                Ok(response) => {
                    return Err(PipelineError::Rejected {
                        service: service.to_string(),
                        status: response.status,
                    });
                }
                Err(failure) => failure,
            };

            if attempt + 1 < attempts {
                let delay = self.policy.backoff_delay(attempt);
                tracing::warn!(
                    service,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "⚠️ {} - retrying",
                    failure.describe()
                );
                self.limiter.clock().sleep(delay).await;
            }
            last_failure = failure;
        }

        tracing::warn!(service, attempts, "❌ Retries exhausted: {}", last_failure.describe());
        match last_failure {
            AttemptFailure::Status(429) => Err(PipelineError::RateLimited {
                service: service.to_string(),
                attempts,
            }),
            failure => Err(PipelineError::ExhaustedRetries {
                service: service.to_string(),
                attempts,
                last_error: failure.describe(),
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapters::http::rate_limiter::tests::ManualClock;
    use crate::domain::ports::TransportError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// 依序回放預先排好的回應
    pub(crate) struct ScriptedTransport {
        script: Mutex<VecDeque<std::result::Result<HttpResponse, TransportError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(
            script: Vec<std::result::Result<HttpResponse, TransportError>>,
        ) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            _request: &HttpRequest,
        ) -> std::result::Result<HttpResponse, TransportError> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Other("script exhausted".to_string())))
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(5),
            max_retries,
            backoff_base: Duration::from_millis(100),
            jitter: false,
        }
    }

    fn build_client(
        transport: Arc<ScriptedTransport>,
        max_retries: u32,
    ) -> (HttpRetryClient, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(RateLimiter::new(Duration::ZERO, clock.clone()));
        (HttpRetryClient::new(transport, limiter, policy(max_retries), 4), clock)
    }

    fn server_error() -> std::result::Result<HttpResponse, TransportError> {
        Ok(HttpResponse::new(503, "unavailable"))
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        for failures in 0..=3usize {
            let mut script: Vec<_> = (0..failures).map(|_| server_error()).collect();
            script.push(Ok(HttpResponse::new(200, "ok")));
            let transport = Arc::new(ScriptedTransport::new(script));
            let (client, _clock) = build_client(transport.clone(), 3);

            let response = client.call(&HttpRequest::get("tsdr", "http://x")).await.unwrap();
            assert_eq!(response.text(), "ok");
            assert_eq!(transport.calls(), failures + 1);
        }
    }

    #[tokio::test]
    async fn test_exhausts_retries() {
        let script = (0..5)
            .map(|i| {
                if i % 2 == 0 {
                    Err(TransportError::Connect("refused".to_string()))
                } else {
                    server_error()
                }
            })
            .collect();
        let transport = Arc::new(ScriptedTransport::new(script));
        let (client, clock) = build_client(transport.clone(), 3);

        let error = client.call(&HttpRequest::get("tsdr", "http://x")).await.unwrap_err();
        assert!(matches!(
            error,
            PipelineError::ExhaustedRetries { attempts: 4, ref last_error, .. } if last_error.contains("503")
        ));
        assert_eq!(transport.calls(), 4);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[tokio::test]
    async fn test_throttling_maps_to_rate_limited() {
        let script = (0..4).map(|_| Ok(HttpResponse::new(429, "slow down"))).collect();
        let transport = Arc::new(ScriptedTransport::new(script));
        let (client, _clock) = build_client(transport, 3);

        let error = client.call(&HttpRequest::get("tsdr", "http://x")).await.unwrap_err();
        assert!(matches!(error, PipelineError::RateLimited { attempts: 4, .. }));
    }

    #[tokio::test]
    async fn test_client_errors_fail_fast() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(HttpResponse::new(404, ""))]));
        let (client, _clock) = build_client(transport.clone(), 3);
        let error = client.call(&HttpRequest::get("tsdr", "http://x")).await.unwrap_err();
        assert!(matches!(error, PipelineError::NotFound { .. }));
        assert_eq!(transport.calls(), 1);

        let transport = Arc::new(ScriptedTransport::new(vec![Ok(HttpResponse::new(401, ""))]));
        let (client, _clock) = build_client(transport.clone(), 3);
        let error = client.call(&HttpRequest::get("tsdr", "http://x")).await.unwrap_err();
        assert!(matches!(error, PipelineError::Rejected { status: 401, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn test_backoff_delay_with_jitter_stays_bounded() {
        let policy = RetryPolicy {
            jitter: true,
            ..policy(3)
        };
        for attempt in 0..4 {
            let base = Duration::from_millis(100 * (1 << attempt));
            let delay = policy.backoff_delay(attempt);
            assert!(delay >= base);
            assert!(delay <= base + base / 4);
        }
    }
}
