use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{GenerateRequest, GenerativeModel};
use crate::error::Result;
use crate::rate_limiter::{RateLimiter, GEMINI};
use crate::utils::RetryPolicy;

/// A model whose calls go through the shared rate limiter and retry policy
///
/// Every attempt first acquires a slot from the limiter, so retries are
/// throttled the same way as first attempts.
#[derive(Clone)]
pub struct ThrottledModel {
    inner: Arc<dyn GenerativeModel>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    key: String,
}

impl ThrottledModel {
    /// Wraps `inner`, throttled under the Gemini limit
    pub fn new(inner: Arc<dyn GenerativeModel>, limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            inner,
            limiter,
            retry,
            key: GEMINI.to_string(),
        }
    }

    /// Uses a different limiter key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// The wrapped model
    pub fn inner(&self) -> &Arc<dyn GenerativeModel> {
        &self.inner
    }
}

#[async_trait]
impl GenerativeModel for ThrottledModel {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        self.retry
            .execute(|| {
                let request = request.clone();
                async move {
                    let waited = self.limiter.acquire(&self.key).await;
                    if !waited.is_zero() {
                        debug!("Waited {:.1}s for {} rate limit", waited.as_secs_f64(), self.key);
                    }
                    self.inner.generate(request).await
                }
            })
            .await
    }
}
