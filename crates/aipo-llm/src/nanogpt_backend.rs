//! NanoGPT HTTP backend
//!
//! NanoGPT speaks the OpenAI chat-completions format but has moved its API
//! between hosts and path layouts, so the backend carries an ordered list of
//! base URLs and scans them until one answers with something other than
//! 404/405.

use crate::http_client::{HttpClient, map_client_error};
use crate::openai::{ChatRequest, ChatResponse, ModelList, convert_messages};
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message, ProviderHealth};
use aipo_config::Config;
use aipo_utils::error::LlmError;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const PROVIDER_NAME: &str = "nanogpt";

pub const DEFAULT_MODEL: &str = "moonshotai/Kimi-K2-Instruct-0905";

/// Official layout first, then HTTP, the legacy `/v1` host and the
/// alternate host.
pub const DEFAULT_BASE_URLS: [&str; 6] = [
    "https://nano-gpt.com/api/v1",
    "http://nano-gpt.com/api/v1",
    "https://api.nanogpt.com",
    "http://api.nanogpt.com",
    "https://nanogpt.com/api/v1",
    "http://nanogpt.com/api/v1",
];

const DEFAULT_API_KEY_ENV: &str = "NANOGPT_API_KEY";

const LARGE_REQUEST_CHARS: usize = 10_000;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct NanoGptParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for NanoGptParams {
    fn default() -> Self {
        Self {
            max_tokens: 10_000,
            temperature: 0.7,
        }
    }
}

pub struct NanoGptBackend {
    client: Arc<HttpClient>,
    base_urls: Vec<String>,
    api_key: String,
    default_model: String,
    default_params: NanoGptParams,
}

/// Chat-completions URL for a base URL.
///
/// Bases already carrying `/api/v1` take `/chat/completions`; anything else
/// is treated as a legacy root and takes `/v1/chat/completions`.
#[must_use]
pub fn completions_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.contains("/api/v1") {
        format!("{base}/chat/completions")
    } else {
        format!("{base}/v1/chat/completions")
    }
}

fn models_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.contains("/api/v1") {
        format!("{base}/models")
    } else {
        format!("{base}/v1/models")
    }
}

impl NanoGptBackend {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if `base_urls` is empty.
    pub fn new(
        client: Arc<HttpClient>,
        api_key: String,
        base_urls: Vec<String>,
        default_model: Option<String>,
        default_params: NanoGptParams,
    ) -> Result<Self, LlmError> {
        if base_urls.is_empty() {
            return Err(LlmError::Misconfiguration(
                "NanoGPT requires at least one base URL in [llm.nanogpt] base_urls".to_string(),
            ));
        }
        Ok(Self {
            client,
            base_urls,
            api_key,
            default_model: default_model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            default_params,
        })
    }

    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the API key environment
    /// variable is not set.
    pub fn new_from_config(config: &Config, client: Arc<HttpClient>) -> Result<Self, LlmError> {
        let section = config.llm.nanogpt.clone().unwrap_or_default();
        let api_key_env = section.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV);
        let api_key = std::env::var(api_key_env).map_err(|_| {
            LlmError::Misconfiguration(format!(
                "NanoGPT API key not found in environment variable '{api_key_env}'. \
                 Please set this variable or configure a different api_key_env in [llm.nanogpt]."
            ))
        })?;

        let base_urls = section
            .base_urls
            .unwrap_or_else(|| DEFAULT_BASE_URLS.iter().map(|u| (*u).to_string()).collect());
        let defaults = NanoGptParams::default();
        let params = NanoGptParams {
            max_tokens: section.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: section.temperature.unwrap_or(defaults.temperature),
        };

        Self::new(client, api_key, base_urls, section.model, params)
    }

    fn resolve_params(&self, inv: &LlmInvocation) -> (String, NanoGptParams) {
        let model = if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        };
        let params = NanoGptParams {
            max_tokens: inv
                .metadata_u32("max_tokens")
                .unwrap_or(self.default_params.max_tokens),
            temperature: inv
                .metadata_f32("temperature")
                .unwrap_or(self.default_params.temperature),
        };
        (model, params)
    }

    /// Try each base URL in order.
    ///
    /// 404/405, transport errors and timeouts move on to the next candidate;
    /// any other response ends the scan.
    async fn post_completion(
        &self,
        body: &ChatRequest,
        timeout: Duration,
    ) -> Result<reqwest::Response, LlmError> {
        let mut saw_not_found = false;
        let mut last_unreachable: Option<LlmError> = None;

        for base_url in &self.base_urls {
            let url = completions_url(base_url);
            let request = self
                .client
                .request(Method::POST, &url)
                .bearer_auth(&self.api_key)
                .header("Content-Type", "application/json")
                .json(body);

            match self.client.send_with_retry(request, timeout, PROVIDER_NAME).await {
                Ok(response)
                    if matches!(
                        response.status(),
                        StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED
                    ) =>
                {
                    warn!(
                        provider = PROVIDER_NAME,
                        url = %url,
                        status = response.status().as_u16(),
                        "Endpoint rejected request, trying next"
                    );
                    saw_not_found = true;
                }
                Ok(response) => {
                    info!(
                        provider = PROVIDER_NAME,
                        url = %url,
                        status = response.status().as_u16(),
                        "Using endpoint"
                    );
                    return Ok(response);
                }
                Err(e @ (LlmError::Transport(_) | LlmError::Timeout { .. })) => {
                    warn!(provider = PROVIDER_NAME, url = %url, error = %e, "Endpoint unreachable, trying next");
                    last_unreachable = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        match last_unreachable {
            Some(e) if !saw_not_found => Err(e),
            _ => Err(LlmError::EndpointNotFound {
                provider: PROVIDER_NAME.to_string(),
                tried: self.base_urls.len(),
            }),
        }
    }
}

#[async_trait]
impl LlmBackend for NanoGptBackend {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let (model, params) = self.resolve_params(&inv);

        let prompt_chars = inv.prompt_chars();
        if prompt_chars > LARGE_REQUEST_CHARS {
            warn!(
                provider = PROVIDER_NAME,
                generation_id = %inv.generation_id,
                prompt_chars = prompt_chars,
                "Large request, the provider may take a while to respond"
            );
        }

        debug!(
            provider = PROVIDER_NAME,
            generation_id = %inv.generation_id,
            step = %inv.step,
            model = %model,
            max_tokens = params.max_tokens,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking NanoGPT backend"
        );

        let body = ChatRequest {
            model: model.clone(),
            messages: convert_messages(&inv.messages),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream: false,
        };

        let response = self.post_completion(&body, inv.timeout).await?;
        if response.status().is_client_error() {
            return Err(map_client_error(response, PROVIDER_NAME).await);
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            LlmError::Transport(format!("Invalid response from NanoGPT: {e}"))
        })?;
        let (content, usage) = parsed.into_content(PROVIDER_NAME)?;

        let mut result = LlmResult::new(content, PROVIDER_NAME, model);
        if let Some(usage) = usage {
            result = result.with_tokens(usage.prompt_tokens, usage.completion_tokens);
        }
        Ok(result)
    }

    async fn health_check(&self) -> ProviderHealth {
        let started = Instant::now();
        let inv = LlmInvocation::new("health", "health", "", HEALTH_TIMEOUT, vec![Message::user("Hello")])
            .with_metadata("max_tokens", serde_json::json!(1))
            .with_metadata("temperature", serde_json::json!(0.0));
        let (model, params) = self.resolve_params(&inv);
        let body = ChatRequest {
            model,
            messages: convert_messages(&inv.messages),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream: false,
        };

        match self.post_completion(&body, HEALTH_TIMEOUT).await {
            Ok(response) if response.status() == StatusCode::OK => {
                ProviderHealth::healthy(PROVIDER_NAME, started.elapsed())
            }
            Ok(response) => ProviderHealth::unhealthy(
                PROVIDER_NAME,
                started.elapsed(),
                format!("status {}", response.status()),
            ),
            Err(e) => ProviderHealth::unhealthy(PROVIDER_NAME, started.elapsed(), e.to_string()),
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let mut last_error = None;
        for base_url in &self.base_urls {
            let request = self
                .client
                .request(Method::GET, &models_url(base_url))
                .bearer_auth(&self.api_key);
            match self
                .client
                .execute_with_retry(request, HEALTH_TIMEOUT, PROVIDER_NAME)
                .await
            {
                Ok(response) => {
                    let list: ModelList = response.json().await.map_err(|e| {
                        LlmError::Transport(format!("Invalid model list from NanoGPT: {e}"))
                    })?;
                    return Ok(list.ids());
                }
                Err(e @ LlmError::Transport(_)) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| LlmError::EndpointNotFound {
            provider: PROVIDER_NAME.to_string(),
            tried: self.base_urls.len(),
        }))
    }
}
