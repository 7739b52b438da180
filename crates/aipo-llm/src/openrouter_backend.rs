//! OpenRouter HTTP backend
//!
//! OpenRouter offers many models behind one OpenAI-compatible API.

use crate::http_client::HttpClient;
use crate::openai::{ChatRequest, ChatResponse, ModelList, convert_messages};
use crate::types::{LlmBackend, LlmInvocation, LlmResult, ProviderHealth};
use aipo_config::Config;
use aipo_utils::error::LlmError;
use async_trait::async_trait;
use reqwest::Method;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub const PROVIDER_NAME: &str = "openrouter";

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

const DEFAULT_MODEL: &str = "moonshotai/kimi-k2";

const DEFAULT_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

const DEFAULT_REFERER: &str = "https://github.com/aipo-dev/aipo";

const DEFAULT_TITLE: &str = "aipo";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for HttpParams {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            temperature: 0.2,
        }
    }
}

pub struct OpenRouterBackend {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: String,
    default_model: String,
    default_params: HttpParams,
}

impl OpenRouterBackend {
    #[must_use]
    pub fn new(
        client: Arc<HttpClient>,
        api_key: String,
        base_url: Option<String>,
        default_model: Option<String>,
        default_params: HttpParams,
    ) -> Self {
        Self {
            client,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            default_model: default_model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            default_params,
        }
    }

    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the API key environment
    /// variable is not set.
    pub fn new_from_config(config: &Config, client: Arc<HttpClient>) -> Result<Self, LlmError> {
        let section = config.llm.openrouter.clone().unwrap_or_default();
        let api_key_env = section.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV);
        let api_key = std::env::var(api_key_env).map_err(|_| {
            LlmError::Misconfiguration(format!(
                "OpenRouter API key not found in environment variable '{api_key_env}'. \
                 Please set this variable or configure a different api_key_env in [llm.openrouter]."
            ))
        })?;

        let defaults = HttpParams::default();
        let params = HttpParams {
            max_tokens: section.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: section.temperature.unwrap_or(defaults.temperature),
        };
        Ok(Self::new(client, api_key, section.base_url, section.model, params))
    }

    fn resolve_params(&self, inv: &LlmInvocation) -> (String, HttpParams) {
        let model = if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        };
        let params = HttpParams {
            max_tokens: inv
                .metadata_u32("max_tokens")
                .unwrap_or(self.default_params.max_tokens),
            temperature: inv
                .metadata_f32("temperature")
                .unwrap_or(self.default_params.temperature),
        };
        (model, params)
    }

    fn authorized(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, &format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", DEFAULT_REFERER)
            .header("X-Title", DEFAULT_TITLE)
    }
}

#[async_trait]
impl LlmBackend for OpenRouterBackend {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let (model, params) = self.resolve_params(&inv);

        debug!(
            provider = PROVIDER_NAME,
            generation_id = %inv.generation_id,
            step = %inv.step,
            model = %model,
            max_tokens = params.max_tokens,
            temperature = params.temperature,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking OpenRouter backend"
        );

        let body = ChatRequest {
            model: model.clone(),
            messages: convert_messages(&inv.messages),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream: false,
        };
        let request = self.authorized(Method::POST, "/chat/completions").json(&body);
        let response = self
            .client
            .execute_with_retry(request, inv.timeout, PROVIDER_NAME)
            .await?;

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            LlmError::Transport(format!("Failed to parse OpenRouter response: {e}"))
        })?;
        let (content, usage) = parsed.into_content(PROVIDER_NAME)?;

        let mut result = LlmResult::new(content, PROVIDER_NAME, model);
        if let Some(usage) = usage {
            result = result.with_tokens(usage.prompt_tokens, usage.completion_tokens);
        }

        debug!(
            provider = PROVIDER_NAME,
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "OpenRouter invocation completed"
        );
        Ok(result)
    }

    async fn health_check(&self) -> ProviderHealth {
        let started = Instant::now();
        let request = self.authorized(Method::GET, "/models");
        match self
            .client
            .execute_with_retry(request, HEALTH_TIMEOUT, PROVIDER_NAME)
            .await
        {
            Ok(_) => ProviderHealth::healthy(PROVIDER_NAME, started.elapsed()),
            Err(e) => ProviderHealth::unhealthy(PROVIDER_NAME, started.elapsed(), e.to_string()),
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let request = self.authorized(Method::GET, "/models");
        let response = self
            .client
            .execute_with_retry(request, HEALTH_TIMEOUT, PROVIDER_NAME)
            .await?;
        let list: ModelList = response.json().await.map_err(|e| {
            LlmError::Transport(format!("Failed to parse OpenRouter model list: {e}"))
        })?;
        Ok(list.ids())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> OpenRouterBackend {
        OpenRouterBackend::new(
            Arc::new(HttpClient::new().unwrap()),
            "test-key".to_string(),
            Some("https://openrouter.example/api/v1/".to_string()),
            Some("google/gemini-2.5-flash".to_string()),
            HttpParams::default(),
        )
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(backend().base_url, "https://openrouter.example/api/v1");
    }

    #[test]
    fn test_resolve_params_uses_defaults() {
        let inv = LlmInvocation::new("g", "tests", "", Duration::from_secs(60), vec![]);
        let (model, params) = backend().resolve_params(&inv);
        assert_eq!(model, "google/gemini-2.5-flash");
        assert_eq!(params.max_tokens, 8192);
        assert!((params.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_resolve_params_overrides_temperature() {
        let inv = LlmInvocation::new("g", "tests", "", Duration::from_secs(60), vec![])
            .with_metadata("temperature", serde_json::json!(0.9));
        let (_, params) = backend().resolve_params(&inv);
        assert!((params.temperature - 0.9).abs() < 1e-6);
    }
}
