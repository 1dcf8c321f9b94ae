use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, info, warn};
use reqwest::Client;
use serde_json::Value;

use crate::LogLevel;
use crate::error::{ExtractError, Result};

/// Statuses retried with backoff: throttling and gateway failures.
pub const RETRYABLE_STATUSES: [u16; 4] = [429, 502, 503, 504];

const REQUEST_TIMEOUT_SECS: u64 = 45;
const NEXT_LINK: &str = "@odata.nextLink";

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Per-page retry ceiling and exponential delay base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per page, including the first. Zero behaves as one.
    pub max_retries: u32,
    /// Seconds; attempt `n` (from 0) waits `backoff_base * 2^n`.
    pub backoff_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_base: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: f64) -> Self {
        Self {
            max_retries,
            backoff_base,
        }
    }

    /// Delay before retrying after a failed `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.backoff_base * 2f64.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or_default()
    }

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Waits between retries.
#[async_trait]
pub trait Backoff: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioBackoff;

#[async_trait]
impl Backoff for TokioBackoff {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Follows `@odata.nextLink` continuation links and accumulates `value` items.
pub struct PaginatedFetcher {
    client: Client,
    token: String,
    policy: RetryPolicy,
    backoff: Arc<dyn Backoff>,
    log_level: LogLevel,
}

impl PaginatedFetcher {
    /// Create a fetcher authenticating every request with `token`.
    pub fn new(token: &str, verify_tls: bool, log_level: LogLevel) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .danger_accept_invalid_certs(!verify_tls)
            .build()?;

        Ok(Self {
            client,
            token: token.to_string(),
            policy: RetryPolicy::default(),
            backoff: Arc::new(TokioBackoff),
            log_level,
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Fetch every page starting at `url`.
    ///
    /// `params` apply to the first request only; continuation links already
    /// carry the query state. A non-list `value` is returned as the single
    /// item and ends pagination. A body that is not a JSON object is a
    /// decode error. Any failure, including exhausted retries, discards what
    /// was accumulated so far.
    pub async fn fetch_all(
        &self,
        url: &str,
        params: Option<&[(&str, &str)]>,
    ) -> Result<Vec<Value>> {
        let mut items: Vec<Value> = vec![];
        let mut next_url = Some(url.to_string());
        let mut page = 1;

        while let Some(page_url) = next_url.take() {
            let page_params = if page == 1 { params } else { None };

            if matches!(self.log_level, LogLevel::Debug) {
                info!("Fetch page {}: {}", page, page_url);
            }

            let mut body = self.fetch_page(&page_url, page_params).await?;

            let value = body
                .as_object_mut()
                .and_then(|object| object.shift_remove("value"));
            match value {
                Some(Value::Array(values)) => items.extend(values),
                Some(single) => {
                    items.push(single);
                    break;
                }
                None => {}
            }

            next_url = body
                .get(NEXT_LINK)
                .and_then(Value::as_str)
                .map(str::to_string);
            page += 1;
        }

        Ok(items)
    }

    /// Fetch one page, retrying retryable statuses with exponential backoff.
    async fn fetch_page(&self, url: &str, params: Option<&[(&str, &str)]>) -> Result<Value> {
        let attempts = self.policy.attempts();
        let mut attempt = 0;

        loop {
            let mut request = self
                .client
                .get(url)
                .bearer_auth(&self.token)
                .header("Accept", "application/json");
            if let Some(params) = params {
                request = request.query(params);
            }

            let resp = request.send().await.map_err(|e| {
                error!("An unexpected error occurred fetching {}: {}", url, e);
                ExtractError::Request(e)
            })?;

            let status = resp.status();

            if status.is_success() {
                let body = resp.text().await?;
                let json: Value = serde_json::from_str(&body).map_err(|e| {
                    error!("Failed to parse JSON from {}: {}", url, e);
                    ExtractError::Decode {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                if !json.is_object() {
                    error!("Expected a JSON object from {}", url);
                    return Err(ExtractError::Decode {
                        url: url.to_string(),
                        reason: "expected a JSON object".to_string(),
                    });
                }
                return Ok(json);
            }

            let code = status.as_u16();
            let retryable = is_retryable_status(code);

            if retryable && attempt + 1 < attempts {
                let delay = self.policy.delay_for(attempt);
                warn!(
                    "HTTP error {} on {}. Retrying in {:.2}s...",
                    code,
                    url,
                    delay.as_secs_f64()
                );
                self.backoff.sleep(delay).await;
                attempt += 1;
                continue;
            }

            let body = resp.text().await.unwrap_or_default();
            error!("HTTP error fetching {}: {} - {}", url, code, body);

            if retryable {
                error!("Max retries exceeded for {}.", url);
                return Err(ExtractError::RetriesExhausted {
                    url: url.to_string(),
                    attempts,
                    status: code,
                });
            }

            return Err(ExtractError::Api {
                status: code,
                url: url.to_string(),
                body,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_exponentially() {
        let policy = RetryPolicy::new(5, 2.0);
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(16));
    }

    #[test]
    fn negative_base_means_no_wait() {
        assert_eq!(RetryPolicy::new(3, -1.0).delay_for(0), Duration::ZERO);
    }

    #[test]
    fn zero_retries_still_attempts_once() {
        assert_eq!(RetryPolicy::new(0, 1.0).attempts(), 1);
    }

    #[test]
    fn retryable_set() {
        for status in [429, 502, 503, 504] {
            assert!(is_retryable_status(status));
        }
        for status in [400, 401, 403, 404, 500] {
            assert!(!is_retryable_status(status));
        }
    }
}
