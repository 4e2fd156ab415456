//! Persisted rate-limit usage counters, keyed by `(scope_key, window)`.
//!
//! This is the durable half of rate limiting: the in-memory limiter tracks
//! live request/token timestamps, and periodically checkpoints its counters
//! here so usage survives a restart and can be inspected or overridden.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageWindow {
    Minute,
    Hour,
    Day,
}

impl UsageWindow {
    fn as_str(self) -> &'static str {
        match self {
            UsageWindow::Minute => "minute",
            UsageWindow::Hour => "hour",
            UsageWindow::Day => "day",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitUsage {
    pub scope_key: String,
    pub window: UsageWindow,
    pub request_count: u64,
    pub token_count: u64,
    pub oldest_request_ts: Option<DateTime<Utc>>,
    pub oldest_token_ts: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl RateLimitUsage {
    fn new(scope_key: String, window: UsageWindow, now: DateTime<Utc>) -> Self {
        Self {
            scope_key,
            window,
            request_count: 0,
            token_count: 0,
            oldest_request_ts: None,
            oldest_token_ts: None,
            updated_at: now,
        }
    }
}

/// Composite string key so the usage table round-trips through a plain
/// JSON object (serde_json object keys must be strings).
pub(crate) fn usage_key(scope_key: &str, window: UsageWindow) -> String {
    format!("{scope_key}|{}", window.as_str())
}

pub(crate) fn record_usage(
    table: &mut HashMap<String, RateLimitUsage>,
    scope_key: &str,
    window: UsageWindow,
    request_delta: u64,
    token_delta: u64,
    now: DateTime<Utc>,
) -> RateLimitUsage {
    let entry = table
        .entry(usage_key(scope_key, window))
        .or_insert_with(|| RateLimitUsage::new(scope_key.to_string(), window, now));

    if request_delta > 0 && entry.oldest_request_ts.is_none() {
        entry.oldest_request_ts = Some(now);
    }
    if token_delta > 0 && entry.oldest_token_ts.is_none() {
        entry.oldest_token_ts = Some(now);
    }
    entry.request_count += request_delta;
    entry.token_count += token_delta;
    entry.updated_at = now;
    entry.clone()
}

/// Adjust `token_count` by a signed delta, clamped at zero. Never moves
/// `oldest_token_ts`.
pub(crate) fn settle_tokens(
    table: &mut HashMap<String, RateLimitUsage>,
    scope_key: &str,
    window: UsageWindow,
    delta: i64,
    now: DateTime<Utc>,
) -> RateLimitUsage {
    let entry = table
        .entry(usage_key(scope_key, window))
        .or_insert_with(|| RateLimitUsage::new(scope_key.to_string(), window, now));

    entry.token_count = entry.token_count.saturating_add_signed(delta);
    entry.updated_at = now;
    entry.clone()
}

pub(crate) fn reset_usage(
    table: &mut HashMap<String, RateLimitUsage>,
    scope_key: &str,
    window: UsageWindow,
    now: DateTime<Utc>,
) {
    table.insert(
        usage_key(scope_key, window),
        RateLimitUsage::new(scope_key.to_string(), window, now),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_record_sets_oldest_timestamps() {
        let mut table = HashMap::new();
        let now = Utc::now();
        let usage = record_usage(&mut table, "global", UsageWindow::Minute, 1, 50, now);
        assert_eq!(usage.request_count, 1);
        assert_eq!(usage.token_count, 50);
        assert_eq!(usage.oldest_request_ts, Some(now));
    }

    #[test]
    fn subsequent_records_accumulate_without_moving_oldest_ts() {
        let mut table = HashMap::new();
        let t0 = Utc::now();
        record_usage(&mut table, "global", UsageWindow::Minute, 1, 10, t0);
        let t1 = t0 + chrono::Duration::seconds(5);
        let usage = record_usage(&mut table, "global", UsageWindow::Minute, 1, 10, t1);
        assert_eq!(usage.request_count, 2);
        assert_eq!(usage.token_count, 20);
        assert_eq!(usage.oldest_request_ts, Some(t0));
        assert_eq!(usage.updated_at, t1);
    }

    #[test]
    fn reset_usage_zeroes_counters() {
        let mut table = HashMap::new();
        let t0 = Utc::now();
        record_usage(&mut table, "openai", UsageWindow::Hour, 5, 500, t0);
        reset_usage(&mut table, "openai", UsageWindow::Hour, t0);
        let usage = table.get(&usage_key("openai", UsageWindow::Hour)).unwrap();
        assert_eq!(usage.request_count, 0);
        assert!(usage.oldest_request_ts.is_none());
    }

    #[test]
    fn settle_tokens_applies_signed_delta_clamped_at_zero() {
        let mut table = HashMap::new();
        let t0 = Utc::now();
        record_usage(&mut table, "global", UsageWindow::Minute, 1, 100, t0);
        let usage = settle_tokens(&mut table, "global", UsageWindow::Minute, -30, t0);
        assert_eq!(usage.token_count, 70);
        let usage = settle_tokens(&mut table, "global", UsageWindow::Minute, -1000, t0);
        assert_eq!(usage.token_count, 0);
    }

    #[test]
    fn distinct_scopes_are_tracked_independently() {
        let mut table = HashMap::new();
        let now = Utc::now();
        record_usage(&mut table, "openai", UsageWindow::Minute, 1, 10, now);
        record_usage(&mut table, "anthropic", UsageWindow::Minute, 1, 20, now);
        assert_eq!(table.len(), 2);
    }
}
