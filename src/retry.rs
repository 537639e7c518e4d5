//! Bounded retry with exponential backoff for calls to external HTTP services.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;

/// Failure of one attempt against an external API
#[derive(Debug, Clone)]
pub struct ApiError {
    pub retryable: bool,
    pub message: String,
}

impl ApiError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            message: message.into(),
        }
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        Self {
            retryable: is_retryable_status(status),
            message: format!("API error {}: {}", status, body),
        }
    }

    /// Connection failures and timeouts are worth another attempt.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        Self {
            retryable: err.is_timeout() || err.is_connect(),
            message: format!("Network error: {}", err),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// 429 rate limit or any 5xx
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Run `op` until it succeeds, fails with a non-retryable error, or `max_retries`
/// retries have been spent.
pub async fn with_retry<T, F, Fut>(
    label: &str,
    max_retries: usize,
    initial_delay: Duration,
    mut op: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let start = std::time::Instant::now();
    let mut attempt = 0;
    let mut delay = initial_delay;

    loop {
        match op().await {
            Ok(value) => {
                log::debug!("{} took {:?} (attempt {})", label, start.elapsed(), attempt + 1);
                return Ok(value);
            }
            Err(e) if e.retryable && attempt < max_retries => {
                log::warn!("{}: retry {}/{} after error: {}", label, attempt + 1, max_retries, e);
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
