//! Retry wrapper for idempotent backend reads.
//!
//! `send_with_retry()` replaces `client.execute(request)` for GET/HEAD calls:
//! - exponential backoff with jitter on 429 and gateway/unavailable 5xx
//! - `Retry-After` header in seconds, capped
//! - every other method is sent exactly once (saves, logins and unlocks are
//!   never replayed behind the caller's back)

use reqwest::{Client, Method, Request, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for HTTP retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRetryConfig {
    /// Maximum number of retry attempts (0 disables retries)
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for HttpRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl HttpRetryConfig {
    pub fn disabled() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }
}

/// 500 is excluded: the backend reports application failures with it and a
/// replay would not change the outcome.
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504)
}

fn is_idempotent(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

fn parse_retry_after(response: &Response) -> Option<Duration> {
    let value = response.headers().get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs.min(60)))
}

fn calculate_delay(attempt: u32, config: &HttpRetryConfig) -> Duration {
    let base = config.base_delay_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_delay_ms as f64);
    let jitter = capped * (0.1 + rand::random::<f64>() * 0.2);
    Duration::from_millis((capped + jitter) as u64)
}

/// Send `request`, retrying idempotent methods on 429/502/503/504.
///
/// The last response is returned as-is when retries run out, so the caller
/// still sees the real status and body.
pub async fn send_with_retry(
    client: &Client,
    request: Request,
    config: &HttpRetryConfig,
) -> Result<Response, reqwest::Error> {
    if !is_idempotent(request.method()) || config.max_retries == 0 {
        return client.execute(request).await;
    }

    let template = request.try_clone();
    let mut last_response = client.execute(request).await?;

    let Some(template) = template else {
        return Ok(last_response);
    };

    for attempt in 0..config.max_retries {
        if !is_retryable_status(last_response.status().as_u16()) {
            return Ok(last_response);
        }

        let delay = parse_retry_after(&last_response)
            .unwrap_or_else(|| calculate_delay(attempt, config));

        tracing::debug!(
            "{} {} returned {}, retry {}/{} after {:?}",
            template.method(),
            template.url().path(),
            last_response.status(),
            attempt + 1,
            config.max_retries,
            delay
        );

        tokio::time::sleep(delay).await;

        let Some(next) = template.try_clone() else {
            return Ok(last_response);
        };
        last_response = client.execute(next).await?;
    }

    Ok(last_response)
}
