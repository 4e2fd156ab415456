use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RateLimiter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Per-scope limits, keyed by scope string: `"global"`,
    /// `"<provider>"`, or `"<provider>:<model>"`.
    #[serde(default)]
    pub scopes: HashMap<String, ScopeLimits>,
    /// Hard upper bound on a single `check_and_reserve` wait; beyond
    /// this the caller receives a `RateLimited` error instead of sleeping.
    #[serde(default = "d_max_wait_ms")]
    pub max_wait_ms: u64,
    /// Fixed tolerance buffer added on top of an API-advised retry delay.
    #[serde(default = "d_advised_retry_buffer_ms")]
    pub advised_retry_buffer_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            scopes: HashMap::new(),
            max_wait_ms: d_max_wait_ms(),
            advised_retry_buffer_ms: d_advised_retry_buffer_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScopeLimits {
    #[serde(default)]
    pub requests_per_minute: Option<u64>,
    #[serde(default)]
    pub requests_per_hour: Option<u64>,
    #[serde(default)]
    pub requests_per_day: Option<u64>,
    #[serde(default)]
    pub tokens_per_minute: Option<u64>,
    #[serde(default)]
    pub tokens_per_hour: Option<u64>,
    #[serde(default)]
    pub tokens_per_day: Option<u64>,
    /// Number of requests in a cold window allowed through without wait.
    #[serde(default)]
    pub burst_size: Option<u64>,
}

impl ScopeLimits {
    /// A scope with every field `None` carries no constraint and is
    /// dropped from the scope list the limiter consults.
    pub fn is_empty(&self) -> bool {
        self.requests_per_minute.is_none()
            && self.requests_per_hour.is_none()
            && self.requests_per_day.is_none()
            && self.tokens_per_minute.is_none()
            && self.tokens_per_hour.is_none()
            && self.tokens_per_day.is_none()
            && self.burst_size.is_none()
    }
}

fn d_max_wait_ms() -> u64 {
    5 * 60 * 1000
}
fn d_advised_retry_buffer_ms() -> u64 {
    1_500
}

impl RateLimitConfig {
    /// `[<provider>:<model>, <provider>, "global"]`, keeping only scope
    /// keys that are both configured and non-empty.
    pub fn scope_chain(&self, provider: &str, model: &str) -> Vec<String> {
        let candidates = [format!("{provider}:{model}"), provider.to_string(), "global".to_string()];
        candidates
            .into_iter()
            .filter(|key| self.scopes.get(key).is_some_and(|s| !s.is_empty()))
            .collect()
    }
}
