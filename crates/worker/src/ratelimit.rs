//! Request/token rate limiting consulted before every provider call, and
//! the retry-delay policy applied when a provider call comes back
//! rate-limited or overloaded.
//!
//! Usage counters live in the shared [`forge_store::Store`] so every
//! worker process sees the same truth; this module owns only the
//! scope/window arithmetic layered on top of them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use forge_domain::config::{RateLimitConfig, ScopeLimits};
use forge_domain::error::{Error, Result};
use forge_store::{Store, UsageWindow};

const WINDOWS: [UsageWindow; 3] = [UsageWindow::Minute, UsageWindow::Hour, UsageWindow::Day];

fn window_duration(window: UsageWindow) -> chrono::Duration {
    match window {
        UsageWindow::Minute => chrono::Duration::minutes(1),
        UsageWindow::Hour => chrono::Duration::hours(1),
        UsageWindow::Day => chrono::Duration::days(1),
    }
}

fn window_limits(limits: &ScopeLimits, window: UsageWindow) -> (Option<u64>, Option<u64>) {
    match window {
        UsageWindow::Minute => (limits.requests_per_minute, limits.tokens_per_minute),
        UsageWindow::Hour => (limits.requests_per_hour, limits.tokens_per_hour),
        UsageWindow::Day => (limits.requests_per_day, limits.tokens_per_day),
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    store: Arc<Store>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, store: Arc<Store>) -> Self {
        Self { config, store }
    }

    /// Reserve capacity for one request estimated to cost
    /// `estimated_tokens`. Sleeps when every limiting scope has room but
    /// not yet; fails with [`Error::RateLimited`] if the computed wait
    /// exceeds `max_wait_ms`.
    pub async fn check_and_reserve(&self, provider: &str, model: &str, estimated_tokens: u64) -> Result<()> {
        let wait = self.wait_needed(provider, model, estimated_tokens);

        if let Some(wait) = wait {
            let max_wait = chrono::Duration::milliseconds(self.config.max_wait_ms as i64);
            if wait > max_wait {
                return Err(Error::RateLimited(format!(
                    "{provider}:{model} would need to wait {}ms, exceeding max_wait_ms={}",
                    wait.num_milliseconds(),
                    self.config.max_wait_ms
                )));
            }
            tokio::time::sleep(Duration::from_millis(wait.num_milliseconds().max(0) as u64)).await;
        }

        for scope in self.config.scope_chain(provider, model) {
            for window in WINDOWS {
                self.store.record_rate_limit_usage(&scope, window, 1, estimated_tokens);
            }
        }
        Ok(())
    }

    /// Largest wait any configured scope/window still requires, or
    /// `None` if every scope already has room (including burst-exempt
    /// scopes). A scope with no configured limits is skipped entirely.
    fn wait_needed(&self, provider: &str, model: &str, estimated_tokens: u64) -> Option<chrono::Duration> {
        let now = Utc::now();
        let mut wait = chrono::Duration::zero();

        for scope in self.config.scope_chain(provider, model) {
            let limits = match self.config.scopes.get(&scope) {
                Some(limits) => limits,
                None => continue,
            };

            for window in WINDOWS {
                let (req_limit, tok_limit) = window_limits(limits, window);
                if req_limit.is_none() && tok_limit.is_none() {
                    continue;
                }

                let usage = self.store.get_rate_limit_usage(&scope, window);
                let request_count = usage.as_ref().map_or(0, |u| u.request_count);
                if limits.burst_size.is_some_and(|b| request_count < b) {
                    continue;
                }

                let duration = window_duration(window);
                let Some(usage) = usage else { continue };

                if let (Some(limit), Some(oldest)) = (req_limit, usage.oldest_request_ts) {
                    if usage.request_count + 1 > limit && now < oldest + duration {
                        wait = wait.max(oldest + duration - now);
                    }
                }
                if let (Some(limit), Some(oldest)) = (tok_limit, usage.oldest_token_ts) {
                    if usage.token_count + estimated_tokens > limit && now < oldest + duration {
                        wait = wait.max(oldest + duration - now);
                    }
                }
            }
        }

        (wait > chrono::Duration::zero()).then_some(wait)
    }

    /// Adjust every scope's token counters by `actual_tokens −
    /// estimated_tokens`. Never moves a counter below zero.
    pub fn settle(&self, provider: &str, model: &str, estimated_tokens: u64, actual_tokens: u64) {
        let delta = actual_tokens as i64 - estimated_tokens as i64;
        if delta == 0 {
            return;
        }
        for scope in self.config.scope_chain(provider, model) {
            for window in WINDOWS {
                self.store.settle_rate_limit_tokens(&scope, window, delta);
            }
        }
    }
}

/// Classifies a provider failure for [`RetryHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryableKind {
    RateLimit,
    Overload,
}

/// Decides whether and how long to wait before retrying a
/// [`Error::ModelRetryable`] failure.
#[derive(Debug, Clone)]
pub struct RetryHandler {
    max_retries: u32,
    advised_buffer: Duration,
}

const RATE_LIMIT_BACKOFF_SEC: [u64; 5] = [2, 5, 20, 40, 60];
const OVERLOAD_BACKOFF_SEC: [u64; 5] = [1, 2, 4, 8, 16];

impl RetryHandler {
    pub fn new(config: &RateLimitConfig, max_retries: u32) -> Self {
        Self {
            max_retries,
            advised_buffer: Duration::from_millis(config.advised_retry_buffer_ms),
        }
    }

    /// `attempt` is 1-indexed (the first retry is attempt 1). Returns
    /// `None` once `max_retries` is exhausted.
    pub fn delay_for(&self, kind: RetryableKind, advised_ms: Option<u64>, attempt: u32) -> Option<Duration> {
        if attempt > self.max_retries {
            return None;
        }
        if let Some(advised_ms) = advised_ms {
            return Some(Duration::from_millis(advised_ms) + self.advised_buffer);
        }
        let series = match kind {
            RetryableKind::RateLimit => &RATE_LIMIT_BACKOFF_SEC,
            RetryableKind::Overload => &OVERLOAD_BACKOFF_SEC,
        };
        let idx = (attempt as usize).saturating_sub(1).min(series.len() - 1);
        Some(Duration::from_secs(series[idx]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn limiter_with(scope: &str, limits: ScopeLimits) -> RateLimiter {
        let mut scopes = HashMap::new();
        scopes.insert(scope.to_string(), limits);
        let config = RateLimitConfig { scopes, ..RateLimitConfig::default() };
        RateLimiter::new(config, Arc::new(Store::in_memory()))
    }

    #[tokio::test]
    async fn first_request_under_limit_reserves_without_waiting() {
        let limiter = limiter_with(
            "global",
            ScopeLimits { requests_per_minute: Some(10), ..Default::default() },
        );
        limiter.check_and_reserve("openai", "gpt-4o", 100).await.unwrap();
        let usage = limiter.store.get_rate_limit_usage("global", UsageWindow::Minute).unwrap();
        assert_eq!(usage.request_count, 1);
    }

    #[tokio::test]
    async fn exhausted_window_with_wait_over_cap_is_rate_limited() {
        let limiter = limiter_with(
            "global",
            ScopeLimits { requests_per_minute: Some(1), ..Default::default() },
        );
        limiter.check_and_reserve("openai", "gpt-4o", 10).await.unwrap();

        let mut config = RateLimitConfig::default();
        config.scopes.insert(
            "global".to_string(),
            ScopeLimits { requests_per_minute: Some(1), ..Default::default() },
        );
        config.max_wait_ms = 0;
        let tight = RateLimiter::new(config, limiter.store.clone());
        let err = tight.check_and_reserve("openai", "gpt-4o", 10).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)));
    }

    #[tokio::test]
    async fn burst_size_allows_requests_through_a_cold_window() {
        let limiter = limiter_with(
            "global",
            ScopeLimits { requests_per_minute: Some(1), burst_size: Some(5), ..Default::default() },
        );
        for _ in 0..5 {
            limiter.check_and_reserve("openai", "gpt-4o", 10).await.unwrap();
        }
    }

    #[tokio::test]
    async fn settle_reduces_reserved_tokens_down_to_actual_usage() {
        let limiter = limiter_with(
            "global",
            ScopeLimits { tokens_per_minute: Some(1000), ..Default::default() },
        );
        limiter.check_and_reserve("openai", "gpt-4o", 500).await.unwrap();
        limiter.settle("openai", "gpt-4o", 500, 120);
        let usage = limiter.store.get_rate_limit_usage("global", UsageWindow::Minute).unwrap();
        assert_eq!(usage.token_count, 120);
    }

    #[test]
    fn retry_handler_uses_advised_delay_plus_buffer() {
        let handler = RetryHandler::new(&RateLimitConfig::default(), 3);
        let delay = handler.delay_for(RetryableKind::RateLimit, Some(3_000), 1).unwrap();
        assert_eq!(delay, Duration::from_millis(4_500));
    }

    #[test]
    fn retry_handler_falls_back_to_series_without_advised_delay() {
        let handler = RetryHandler::new(&RateLimitConfig::default(), 5);
        assert_eq!(handler.delay_for(RetryableKind::RateLimit, None, 1), Some(Duration::from_secs(2)));
        assert_eq!(handler.delay_for(RetryableKind::Overload, None, 2), Some(Duration::from_secs(2)));
    }

    #[test]
    fn retry_handler_exhausts_after_max_retries() {
        let handler = RetryHandler::new(&RateLimitConfig::default(), 2);
        assert!(handler.delay_for(RetryableKind::RateLimit, None, 3).is_none());
    }
}
