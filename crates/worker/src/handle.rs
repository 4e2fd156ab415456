//! A leased handle to the pool's shared rate limiter and retry policy.
//!
//! [`WorkerPool::acquire_worker`] hands callers a [`Worker`] rather than a
//! raw provider reference: every chat call made through it is reserved
//! against [`RateLimiter`] first and, on a [`forge_domain::Error::ModelRetryable`]
//! failure, retried according to [`RetryHandler`] until the policy gives up.

use std::sync::Arc;

use forge_domain::error::{Error, Result};
use forge_providers::{ChatRequest, ChatResponse, LlmProvider};

use crate::ratelimit::{RateLimiter, RetryHandler, RetryableKind};

/// A rate-limited, retrying handle to a provider call.
///
/// Cheap to hold across a single plan/request; does not own a worker
/// process itself (that's [`crate::pool::PooledWorker`]'s job) -- it only
/// gates and retries the LLM call the caller makes through it.
pub struct Worker {
    rate_limiter: Arc<RateLimiter>,
    retry: RetryHandler,
}

impl Worker {
    pub fn new(rate_limiter: Arc<RateLimiter>, retry: RetryHandler) -> Self {
        Self { rate_limiter, retry }
    }

    /// A `Worker` with an unbounded rate limiter and no retries, for tests
    /// and standalone tools that don't go through [`crate::pool::WorkerPool`].
    pub fn unlimited() -> Self {
        let config = forge_domain::config::RateLimitConfig::default();
        let store = Arc::new(forge_store::Store::in_memory());
        Self::new(Arc::new(RateLimiter::new(config, store)), RetryHandler::new(&forge_domain::config::RateLimitConfig::default(), 0))
    }

    /// Send a chat request through the rate limiter, retrying
    /// provider-reported rate-limit/overload failures per [`RetryHandler`].
    pub async fn chat(&self, provider: &dyn LlmProvider, req: ChatRequest) -> Result<ChatResponse> {
        let provider_id = provider.provider_id().to_string();
        let model = req.model.clone().unwrap_or_else(|| "default".to_string());
        let estimated = req.estimated_tokens();

        let mut attempt: u32 = 0;
        loop {
            self.rate_limiter.check_and_reserve(&provider_id, &model, estimated).await?;

            match provider.chat(req.clone()).await {
                Ok(resp) => {
                    let actual = resp.usage.as_ref().map_or(estimated, |u| u.total_tokens as u64);
                    self.rate_limiter.settle(&provider_id, &model, estimated, actual);
                    return Ok(resp);
                }
                Err(Error::ModelRetryable { provider, message, retry_after_ms }) => {
                    attempt += 1;
                    let kind = classify_retryable(&message);
                    match self.retry.delay_for(kind, retry_after_ms, attempt) {
                        Some(delay) => {
                            tracing::warn!(provider = %provider, attempt, delay_ms = delay.as_millis() as u64, "retrying after provider backoff");
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(Error::ModelRetryable { provider, message, retry_after_ms }),
                    }
                }
                Err(other) => return Err(other),
            }
        }
    }
}

/// Heuristic classification -- [`Error::ModelRetryable`] carries no explicit
/// kind, so we read it off the message the provider adapter attached.
fn classify_retryable(message: &str) -> RetryableKind {
    if message.to_lowercase().contains("overload") {
        RetryableKind::Overload
    } else {
        RetryableKind::RateLimit
    }
}
