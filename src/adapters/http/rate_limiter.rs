use crate::domain::ports::Clock;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// 以 tokio 計時器實作的時鐘
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

type Slot = Arc<tokio::sync::Mutex<Option<Instant>>>;

/// 依服務鍵控制呼叫間隔。同一服務的取用彼此排隊，間隔至少為設定值
pub struct RateLimiter {
    default_interval: Duration,
    overrides: HashMap<String, Duration>,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl RateLimiter {
    pub fn new(default_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            default_interval,
            overrides: HashMap::new(),
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_service_interval(mut self, service: &str, interval: Duration) -> Self {
        self.overrides.insert(service.to_string(), interval);
        self
    }

    pub fn interval_for(&self, service: &str) -> Duration {
        self.overrides
            .get(service)
            .copied()
            .unwrap_or(self.default_interval)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    fn slot(&self, service: &str) -> Slot {
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(slots.entry(service.to_string()).or_default())
    }

    /// 等到距離同服務上一次取用至少一個間隔後才返回
    pub async fn acquire(&self, service: &str) {
        let interval = self.interval_for(service);
        let slot = self.slot(service);
        let mut last = slot.lock().await;

        if let Some(previous) = *last {
            let ready_at = previous + interval;
            let now = self.clock.now();
            if ready_at > now {
                let wait = ready_at - now;
                tracing::trace!(service, wait_ms = wait.as_millis() as u64, "⏳ Rate limit wait");
                self.clock.sleep(wait).await;
            }
        }

        *last = Some(self.clock.now());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 模擬時鐘：sleep 只推進虛擬時間
    pub(crate) struct ManualClock {
        base: Instant,
        offset: Mutex<Duration>,
        sleeps: Mutex<Vec<Duration>>,
    }

    impl ManualClock {
        pub(crate) fn new() -> Self {
            Self {
                base: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
                sleeps: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn advance(&self, duration: Duration) {
            *self.offset.lock().unwrap() += duration;
        }

        pub(crate) fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.lock().unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
            self.advance(duration);
        }
    }

    #[tokio::test]
    async fn test_consecutive_acquisitions_are_spaced() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(Duration::from_millis(750), clock.clone());

        let mut stamps = Vec::new();
        for step in 0..6u64 {
            // uneven caller-side work between calls
            clock.advance(Duration::from_millis(step * 200));
            limiter.acquire("tsdr").await;
            stamps.push(clock.now());
        }

        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(750));
        }
    }

    #[tokio::test]
    async fn test_first_acquisition_does_not_wait() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(Duration::from_secs(1), clock.clone());

        limiter.acquire("ttabvue").await;
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_services_are_paced_independently() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(Duration::from_millis(500), clock.clone())
            .with_service_interval("vision", Duration::from_secs(2));

        limiter.acquire("tsdr").await;
        limiter.acquire("vision").await;
        assert!(clock.sleeps().is_empty());

        limiter.acquire("vision").await;
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);
        assert_eq!(limiter.interval_for("tsdr"), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_gap() {
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(750), clock.clone()));

        let stamps = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = Arc::clone(&limiter);
            let clock = Arc::clone(&clock);
            let stamps = Arc::clone(&stamps);
            handles.push(tokio::spawn(async move {
                limiter.acquire("tsdr").await;
                stamps.lock().unwrap().push(clock.now());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut stamps = stamps.lock().unwrap().clone();
        stamps.sort();
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(750));
        }
    }
}
