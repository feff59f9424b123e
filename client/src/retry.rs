//! Transport-level retry with a fixed delay.
//!
//! This is the "hard" retry a [`Client`](crate::Client) performs inside one
//! `call`. Whatever is still failing afterwards is classified and handed to
//! the caller, which may re-issue the call (the poll loop does for transient
//! failures).
//!
//! # Retryable Conditions
//!
//! - HTTP 408, 409, 429, 5xx
//! - Connect, timeout and request-building errors
//! - `x-should-retry: true` forces retry
//! - `x-should-retry: false` forbids retry
//!
//! # Delay
//!
//! Fixed `RetryConfig::delay` between attempts, replaced by `Retry-After-Ms` /
//! `Retry-After` when the server sends a value in `(0, 60s)`.
//!
//! # Headers
//!
//! - `X-Retry-Count`: 0 for initial, 1+ for retries
//! - `Idempotency-Key`: `pncp-retry-{uuid}`, same across all attempts

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode, header::HeaderMap};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retries (not counting initial request).
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_millis(500),
        }
    }
}

/// Parse `Retry-After` or `Retry-After-Ms` headers.
///
/// Returns `Some(duration)` if a valid value is found and `0 < duration < 60s`.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let in_range = |d: Duration| d > Duration::ZERO && d < Duration::from_secs(60);

    let from_ms = headers
        .get("retry-after-ms")
        .and_then(|val| val.to_str().ok())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|ms| ms.is_finite() && *ms > 0.0)
        .map(|ms| Duration::from_secs_f64(ms / 1000.0))
        .filter(|d| in_range(*d));
    if from_ms.is_some() {
        return from_ms;
    }

    headers
        .get("retry-after")
        .and_then(|val| val.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .filter(|d| in_range(*d))
}

/// Determine if a response status is retryable.
///
/// Respects `x-should-retry` header override if present.
#[must_use]
pub fn should_retry(status: StatusCode, headers: &HeaderMap) -> bool {
    if let Some(val) = headers.get("x-should-retry")
        && let Ok(s) = val.to_str()
    {
        if s.eq_ignore_ascii_case("true") {
            return true;
        }
        if s.eq_ignore_ascii_case("false") {
            return false;
        }
    }

    matches!(status.as_u16(), 408 | 409 | 429 | 500..=599)
}

#[must_use]
pub fn retry_delay(config: &RetryConfig, headers: Option<&HeaderMap>) -> Duration {
    headers
        .and_then(parse_retry_after)
        .unwrap_or(config.delay)
}

pub fn add_retry_headers(
    builder: RequestBuilder,
    retry_count: u32,
    idempotency_key: &str,
) -> RequestBuilder {
    builder
        .header("X-Retry-Count", retry_count.to_string())
        .header("Idempotency-Key", idempotency_key)
}

#[must_use]
pub fn generate_idempotency_key() -> String {
    format!("pncp-retry-{}", Uuid::new_v4())
}

/// Outcome of a retried request.
///
/// Success and failure are distinct variants so an error response can never
/// be read as a result body by accident.
#[derive(Debug)]
pub enum RetryOutcome {
    /// 2xx status.
    Success(Response),
    /// Non-2xx status, either not retryable or still failing after the last
    /// attempt. The response is kept for error body inspection.
    HttpError(Response),
    /// Retryable connection failure on every attempt.
    ConnectionError {
        attempts: u32,
        source: reqwest::Error,
    },
    /// Connection failure that must not be retried.
    NonRetryable(reqwest::Error),
}

/// Send a request, retrying on retryable statuses and connection errors.
///
/// `build_request` is called once per attempt. All attempts share one
/// `Idempotency-Key`.
pub async fn send_with_retry<F>(build_request: F, config: &RetryConfig) -> RetryOutcome
where
    F: Fn() -> RequestBuilder,
{
    let idempotency_key = generate_idempotency_key();
    let mut retry_count = 0;

    loop {
        let last_attempt = retry_count >= config.max_retries;
        let request = add_retry_headers(build_request(), retry_count, &idempotency_key);

        let delay = match request.send().await {
            Ok(response) if response.status().is_success() => {
                return RetryOutcome::Success(response);
            }
            Ok(response) => {
                let status = response.status();
                if last_attempt || !should_retry(status, response.headers()) {
                    return RetryOutcome::HttpError(response);
                }
                let delay = retry_delay(config, Some(response.headers()));
                tracing::debug!(
                    status = %status,
                    retry_count = retry_count + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying request after error status"
                );
                delay
            }
            Err(e) if is_retryable_error(&e) => {
                if last_attempt {
                    return RetryOutcome::ConnectionError {
                        attempts: retry_count + 1,
                        source: e,
                    };
                }
                let delay = retry_delay(config, None);
                tracing::debug!(
                    error = %e,
                    retry_count = retry_count + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying request after connection error"
                );
                delay
            }
            Err(e) => return RetryOutcome::NonRetryable(e),
        };

        tokio::time::sleep(delay).await;
        retry_count += 1;
    }
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_parse_retry_after_ms() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after-ms", HeaderValue::from_static("1500"));
        assert_eq!(
            parse_retry_after(&headers),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("5"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_parse_retry_after_prefers_ms_header() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("5"));
        headers.insert("retry-after-ms", HeaderValue::from_static("250"));
        assert_eq!(
            parse_retry_after(&headers),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_parse_retry_after_out_of_range() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("120"));
        assert_eq!(parse_retry_after(&headers), None);

        headers.clear();
        headers.insert("retry-after", HeaderValue::from_static("0"));
        assert_eq!(parse_retry_after(&headers), None);

        headers.clear();
        headers.insert("retry-after-ms", HeaderValue::from_static("-5"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_should_retry_status_codes() {
        let headers = HeaderMap::new();
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS, &headers));
        assert!(should_retry(StatusCode::INTERNAL_SERVER_ERROR, &headers));
        assert!(should_retry(StatusCode::BAD_GATEWAY, &headers));
        assert!(should_retry(StatusCode::SERVICE_UNAVAILABLE, &headers));
        assert!(should_retry(StatusCode::GATEWAY_TIMEOUT, &headers));
        assert!(should_retry(StatusCode::REQUEST_TIMEOUT, &headers));
        assert!(should_retry(StatusCode::CONFLICT, &headers));

        assert!(!should_retry(StatusCode::BAD_REQUEST, &headers));
        assert!(!should_retry(StatusCode::UNAUTHORIZED, &headers));
        assert!(!should_retry(StatusCode::NOT_FOUND, &headers));
    }

    #[test]
    fn test_should_retry_header_override() {
        let mut headers = HeaderMap::new();

        headers.insert("x-should-retry", HeaderValue::from_static("true"));
        assert!(should_retry(StatusCode::BAD_REQUEST, &headers));

        headers.clear();
        headers.insert("x-should-retry", HeaderValue::from_static("FALSE"));
        assert!(!should_retry(StatusCode::TOO_MANY_REQUESTS, &headers));
    }

    #[test]
    fn test_retry_delay_is_fixed() {
        let config = RetryConfig {
            max_retries: 5,
            delay: Duration::from_millis(750),
        };
        assert_eq!(retry_delay(&config, None), Duration::from_millis(750));
        assert_eq!(
            retry_delay(&config, Some(&HeaderMap::new())),
            Duration::from_millis(750)
        );
    }

    #[test]
    fn test_retry_delay_respects_retry_after() {
        let config = RetryConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("3"));

        assert_eq!(retry_delay(&config, Some(&headers)), Duration::from_secs(3));
    }

    #[test]
    fn test_generate_idempotency_key() {
        let key1 = generate_idempotency_key();
        let key2 = generate_idempotency_key();
        assert!(key1.starts_with("pncp-retry-"));
        assert_ne!(key1, key2);
    }
}
