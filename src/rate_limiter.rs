use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::info;

use crate::config::RateLimits;
use crate::utils::retry::seconds;

/// Key under which model calls are limited
pub const GEMINI: &str = "gemini";

/// Limits the rate of operations to prevent API rate limit issues
///
/// Each key has a sliding window (at most `requests` calls per `window`)
/// and a minimum spacing between two consecutive calls.
#[derive(Debug)]
pub struct RateLimiter {
    limits: HashMap<String, RateLimit>,
    state: Arc<Mutex<HashMap<String, RateLimitState>>>,
}

#[derive(Debug, Clone)]
struct RateLimit {
    requests: usize,
    window: Duration,
    min_interval: Duration,
}

#[derive(Debug, Default)]
struct RateLimitState {
    requests: VecDeque<Instant>,
    last_request: Option<Instant>,
}

impl RateLimiter {
    /// Creates a new rate limiter with no configured keys
    pub fn new() -> Self {
        Self {
            limits: HashMap::new(),
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Creates a limiter with the model limit taken from config
    pub fn from_config(limits: &RateLimits) -> Self {
        Self::new().with_limit(
            GEMINI,
            limits.gemini_requests_per_minute,
            Duration::from_secs(60),
            seconds(limits.gemini_min_delay_seconds),
        )
    }

    /// Builder-style variant of [`RateLimiter::add_limit`]
    pub fn with_limit(
        mut self,
        key: &str,
        requests: usize,
        window: Duration,
        min_interval: Duration,
    ) -> Self {
        self.add_limit(key, requests, window, min_interval);
        self
    }

    /// Adds a rate limit for the specified key
    pub fn add_limit(&mut self, key: &str, requests: usize, window: Duration, min_interval: Duration) {
        self.limits.insert(
            key.to_string(),
            RateLimit {
                requests: requests.max(1),
                window,
                min_interval,
            },
        );
    }

    /// Acquires a permit for the specified key, waiting if necessary
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&self, key: &str) -> Duration {
        let limit = self.limits.get(key).cloned().unwrap_or(RateLimit {
            requests: 10,
            window: Duration::from_secs(60),
            min_interval: Duration::ZERO,
        });

        let started = Instant::now();
        loop {
            let mut state = self.state.lock().await;
            let entry = state.entry(key.to_string()).or_default();
            let now = Instant::now();

            if let Some(last) = entry.last_request {
                let since_last = now.duration_since(last);
                if since_last < limit.min_interval {
                    let wait = limit.min_interval - since_last;
                    drop(state);
                    info!("Minimum delay for {}: waiting {:.1}s", key, wait.as_secs_f64());
                    sleep(wait).await;
                    continue;
                }
            }

            while let Some(&oldest) = entry.requests.front() {
                if now.duration_since(oldest) >= limit.window {
                    entry.requests.pop_front();
                } else {
                    break;
                }
            }

            if entry.requests.len() < limit.requests {
                entry.requests.push_back(now);
                entry.last_request = Some(now);
                return now.duration_since(started);
            }

            // Window is full: sleep until the oldest call slides out.
            let oldest = entry.requests.front().copied().unwrap_or(now);
            let wait = limit.window.saturating_sub(now.duration_since(oldest));
            drop(state);
            info!(
                "Rate limit protection for {}: waiting {:.1}s",
                key,
                wait.as_secs_f64()
            );
            sleep(wait).await;
        }
    }

    /// Number of calls recorded for `key` inside its current window
    pub async fn in_flight(&self, key: &str) -> usize {
        let window = self
            .limits
            .get(key)
            .map(|l| l.window)
            .unwrap_or(Duration::from_secs(60));
        let state = self.state.lock().await;
        let now = Instant::now();
        state
            .get(key)
            .map(|s| {
                s.requests
                    .iter()
                    .filter(|&&t| now.duration_since(t) < window)
                    .count()
            })
            .unwrap_or(0)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(requests: usize, min_interval_secs: u64) -> RateLimiter {
        RateLimiter::new().with_limit(
            "svc",
            requests,
            Duration::from_secs(60),
            Duration::from_secs(min_interval_secs),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_call_is_free() {
        let limiter = limiter(5, 12);
        assert_eq!(limiter.acquire("svc").await, Duration::ZERO);
        assert_eq!(limiter.in_flight("svc").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_interval_spacing() {
        let limiter = limiter(5, 12);
        limiter.acquire("svc").await;

        tokio::time::advance(Duration::from_secs(5)).await;
        let waited = limiter.acquire("svc").await;
        assert_eq!(waited, Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_window_blocks_until_oldest_expires() {
        let limiter = limiter(2, 0);
        let start = Instant::now();

        limiter.acquire("svc").await;
        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.acquire("svc").await;

        limiter.acquire("svc").await;
        assert_eq!(start.elapsed(), Duration::from_secs(60));
        assert_eq!(limiter.in_flight("svc").await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_key_uses_default_limit() {
        let limiter = RateLimiter::new();
        for _ in 0..10 {
            assert_eq!(limiter.acquire("other").await, Duration::ZERO);
        }
        let waited = limiter.acquire("other").await;
        assert_eq!(waited, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_respect_limit() {
        let limiter = Arc::new(limiter(3, 0));
        let start = Instant::now();

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire("svc").await;
                    start.elapsed()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }
        finished.sort();

        assert!(finished[..3].iter().all(|d| *d == Duration::ZERO));
        assert!(finished[3..].iter().all(|d| *d >= Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_from_config() {
        let limiter = RateLimiter::from_config(&RateLimits::default());
        limiter.acquire(GEMINI).await;
        let waited = limiter.acquire(GEMINI).await;
        assert_eq!(waited, Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_from_config_ignores_negative_delay() {
        let limiter = RateLimiter::from_config(&RateLimits {
            gemini_requests_per_minute: 10,
            gemini_min_delay_seconds: -3.0,
        });
        limiter.acquire(GEMINI).await;
        assert_eq!(limiter.acquire(GEMINI).await, Duration::ZERO);
    }
}
