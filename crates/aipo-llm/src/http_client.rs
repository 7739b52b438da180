//! Shared HTTP client for the HTTP-based providers
//!
//! One pooled `reqwest::Client` per process, with a timeout cap and a retry
//! policy for server errors and network failures.

use aipo_utils::error::LlmError;
use aipo_utils::redaction::redact_error_message;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Default maximum HTTP timeout (5 minutes)
pub const DEFAULT_MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of retry attempts for 5xx and network failures
const MAX_RETRIES: u32 = 2;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Error bodies are cut to this many characters before surfacing.
const ERROR_BODY_LIMIT: usize = 200;

/// Pooled HTTP client with timeout and retry policy.
///
/// - Per-request timeout: `min(request_timeout, max_timeout)`
/// - Up to 2 retries for 5xx and network failures, with linear back-off
/// - No retries for 4xx responses
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    max_timeout: Duration,
    initial_backoff: Duration,
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the client cannot be constructed
    pub fn new() -> Result<Self, LlmError> {
        Self::with_settings(DEFAULT_MAX_HTTP_TIMEOUT, INITIAL_BACKOFF)
    }

    /// Client with a custom timeout cap and back-off step.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the client cannot be constructed
    pub fn with_settings(max_timeout: Duration, initial_backoff: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("aipo/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LlmError::Misconfiguration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_timeout,
            initial_backoff,
        })
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Send with the retry policy, returning any response below 500.
    ///
    /// Callers that need to inspect 4xx statuses themselves (endpoint scans)
    /// use this; everyone else uses [`execute_with_retry`](Self::execute_with_retry).
    ///
    /// # Errors
    ///
    /// - `LlmError::ProviderOutage` for 5xx after retries
    /// - `LlmError::Timeout` when the request times out
    /// - `LlmError::Transport` for network errors after retries
    pub async fn send_with_retry(
        &self,
        request_builder: RequestBuilder,
        request_timeout: Duration,
        provider_name: &str,
    ) -> Result<Response, LlmError> {
        let effective_timeout = request_timeout.min(self.max_timeout);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let request = request_builder
                .try_clone()
                .ok_or_else(|| LlmError::Transport("Failed to clone request for retry".to_string()))?
                .timeout(effective_timeout)
                .build()
                .map_err(|e| LlmError::Transport(format!("Failed to build request: {e}")))?;

            debug!(
                provider = provider_name,
                attempt = attempt,
                url = %request.url(),
                timeout_secs = effective_timeout.as_secs(),
                "Executing HTTP request"
            );

            match self.client.execute(request).await {
                Ok(response) if response.status().is_server_error() => {
                    let status = response.status();
                    if attempt <= MAX_RETRIES {
                        warn!(
                            provider = provider_name,
                            attempt = attempt,
                            status = status.as_u16(),
                            "Server error, will retry"
                        );
                        tokio::time::sleep(self.initial_backoff * attempt).await;
                        continue;
                    }
                    return Err(LlmError::ProviderOutage(format!(
                        "{provider_name} returned server error: {status}"
                    )));
                }
                Ok(response) => return Ok(response),
                Err(e) if e.is_timeout() => {
                    return Err(LlmError::Timeout {
                        duration: effective_timeout,
                    });
                }
                Err(e) => {
                    let message = redact_error_message(&e.to_string());
                    if attempt <= MAX_RETRIES {
                        warn!(
                            provider = provider_name,
                            attempt = attempt,
                            error = %message,
                            "Network error, will retry"
                        );
                        tokio::time::sleep(self.initial_backoff * attempt).await;
                        continue;
                    }
                    return Err(LlmError::Transport(format!(
                        "{provider_name} request failed: {message}"
                    )));
                }
            }
        }
    }

    /// Send with the retry policy and map every 4xx to an `LlmError`.
    ///
    /// # Errors
    ///
    /// As [`send_with_retry`](Self::send_with_retry), plus
    /// `ProviderAuth` for 401/403, `ProviderQuota` for 429 and `Transport`
    /// for any other 4xx.
    pub async fn execute_with_retry(
        &self,
        request_builder: RequestBuilder,
        request_timeout: Duration,
        provider_name: &str,
    ) -> Result<Response, LlmError> {
        let response = self
            .send_with_retry(request_builder, request_timeout, provider_name)
            .await?;
        if response.status().is_client_error() {
            return Err(map_client_error(response, provider_name).await);
        }
        Ok(response)
    }
}

/// Map a 4xx response to an `LlmError`, reading (and truncating) its body.
pub(crate) async fn map_client_error(response: Response, provider_name: &str) -> LlmError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body = redact_error_message(&truncate_chars(&body, ERROR_BODY_LIMIT));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LlmError::ProviderAuth(format!("{provider_name} authentication failed: {status}"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            LlmError::ProviderQuota(format!("{provider_name} rate limit exceeded: {status}"))
        }
        _ => LlmError::Transport(format!(
            "{provider_name} returned client error: {status}: {body}"
        )),
    }
}

pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds() {
        assert!(HttpClient::new().is_ok());
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("short", 200), "short");
        let long = "é".repeat(300);
        let cut = truncate_chars(&long, 200);
        assert_eq!(cut.chars().count(), 203);
        assert!(cut.ends_with("..."));
    }
}
