use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::warn;

use crate::config::RetrySettings;
use crate::error::Result;

/// Exponential backoff for calls that hit upstream rate limits
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Growth factor applied per attempt
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: seconds(settings.base_delay_seconds),
            multiplier: settings.multiplier,
        }
    }
}

impl RetryPolicy {
    /// Delay slept after the failed attempt number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        seconds(self.base_delay.as_secs_f64() * factor)
    }

    /// Runs `operation`, retrying only rate-limited failures
    ///
    /// Any other error is returned on the spot. The last rate-limited error is
    /// returned once attempts run out.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_rate_limited() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "Rate limit hit. Retry {}/{} after {:.0}s: {}",
                        attempt + 1,
                        self.max_attempts,
                        delay.as_secs_f64(),
                        e
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_rate_limited() {
                        warn!("Max retries reached after rate limiting");
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// Converts fractional seconds to a duration without panicking
///
/// Negative and NaN values become zero; values too large to represent
/// saturate at [`Duration::MAX`].
pub fn seconds(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Runs `operation` under `policy`
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    policy.execute(operation).await
}
