//! Shared utility functions for provider adapters.

use forge_domain::config::AuthConfig;
use forge_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve the API key from an [`AuthConfig`].
///
/// Precedence:
/// 1. `key` field (plaintext — warn)
/// 2. `env` field (reads environment variable)
/// 3. Error
pub fn resolve_api_key(auth: &AuthConfig) -> Result<String> {
    if let Some(ref key) = auth.key {
        tracing::warn!(
            "API key loaded from plaintext config field 'key' — prefer 'env' instead"
        );
        return Ok(key.clone());
    }

    if let Some(ref env_var) = auth.env {
        return std::env::var(env_var).map_err(|_| {
            Error::Auth(format!(
                "environment variable '{}' not set or not valid UTF-8",
                env_var
            ))
        });
    }

    Err(Error::Auth(
        "no API key configured: set 'key' or 'env' in AuthConfig".into(),
    ))
}

/// Classify a non-2xx HTTP response from a chat endpoint.
///
/// 429 and 503/529 (rate-limited / overloaded) map to
/// [`Error::ModelRetryable`] so [`forge_worker::RetryHandler`] can back off
/// and retry; everything else is a plain [`Error::Provider`] failure. When
/// the provider sends a `Retry-After` header (seconds) it is carried through
/// as `retry_after_ms` so the retry delay honors the provider's own advice.
pub(crate) fn classify_http_error(
    provider: &str,
    status: reqwest::StatusCode,
    headers: &reqwest::header::HeaderMap,
    body: &str,
) -> Error {
    let message = format!("HTTP {} - {}", status.as_u16(), body);
    match status.as_u16() {
        429 | 503 | 529 => Error::ModelRetryable {
            provider: provider.to_string(),
            message,
            retry_after_ms: retry_after_ms(headers),
        },
        _ => Error::Provider {
            provider: provider.to_string(),
            message,
        },
    }
}

fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(|secs| secs * 1000)
}
