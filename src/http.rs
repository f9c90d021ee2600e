//! Outbound JSON requests to model APIs.
//!
//! Generation backends and remote embedding providers share one retry policy:
//!
//! - HTTP 429 and 5xx → retry
//! - other HTTP 4xx → fail immediately
//! - network errors → retry
//! - a 2xx body that is not JSON → fail immediately
//! - backoff: 1s, 2s, 4s, … capped at 32s

use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use crate::error::HttpError;

const MAX_BACKOFF_EXPONENT: u32 = 5;

/// Delay before retry number `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(MAX_BACKOFF_EXPONENT))
}

/// POST `body` to `url` and parse the JSON reply, retrying transient
/// failures up to `max_retries` times.
pub async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    max_retries: u32,
) -> Result<Value, HttpError> {
    let mut attempt = 0;
    loop {
        match post_json(client, url, bearer, body).await {
            Ok(json) => return Ok(json),
            Err(err) if err.is_retryable() && attempt < max_retries => {
                attempt += 1;
                warn!(url, attempt, max_retries, error = %err, "request failed, retrying");
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
) -> Result<Value, HttpError> {
    let mut req = client.post(url).json(body);
    if let Some(token) = bearer {
        req = req.bearer_auth(token);
    }

    let response = req.send().await?;
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(HttpError::Status {
            status: status.as_u16(),
            body: text,
        });
    }
    serde_json::from_str(&text)
        .map_err(|e| HttpError::Malformed(format!("{} (body: {})", e, preview(&text))))
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}
