//! Anthropic Messages API backend

use crate::http_client::HttpClient;
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message, ProviderHealth, Role};
use aipo_config::Config;
use aipo_utils::error::LlmError;
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub const PROVIDER_NAME: &str = "anthropic";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct AnthropicParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for AnthropicParams {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            temperature: 0.2,
        }
    }
}

pub struct AnthropicBackend {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: String,
    default_model: String,
    default_params: AnthropicParams,
}

impl AnthropicBackend {
    #[must_use]
    pub fn new(
        client: Arc<HttpClient>,
        api_key: String,
        base_url: Option<String>,
        default_model: Option<String>,
        default_params: AnthropicParams,
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
        let section = config.llm.anthropic.clone().unwrap_or_default();
        let api_key_env = section.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV);
        let api_key = std::env::var(api_key_env).map_err(|_| {
            LlmError::Misconfiguration(format!(
                "Anthropic API key not found in environment variable '{api_key_env}'. \
                 Please set this variable or configure a different api_key_env in [llm.anthropic]."
            ))
        })?;

        let defaults = AnthropicParams::default();
        let params = AnthropicParams {
            max_tokens: section.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: section.temperature.unwrap_or(defaults.temperature),
        };
        Ok(Self::new(client, api_key, section.base_url, section.model, params))
    }

    fn resolve_params(&self, inv: &LlmInvocation) -> (String, AnthropicParams) {
        let model = if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        };
        let params = AnthropicParams {
            max_tokens: inv
                .metadata_u32("max_tokens")
                .unwrap_or(self.default_params.max_tokens),
            temperature: inv
                .metadata_f32("temperature")
                .unwrap_or(self.default_params.temperature),
        };
        (model, params)
    }

    /// Split system messages into the top-level `system` field.
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system_prompt: Option<String> = None;
        let mut converted = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => match system_prompt.as_mut() {
                    Some(existing) => {
                        existing.push_str("\n\n");
                        existing.push_str(&msg.content);
                    }
                    None => system_prompt = Some(msg.content.clone()),
                },
                Role::User | Role::Assistant => converted.push(AnthropicMessage {
                    role: msg.role.as_str(),
                    content: msg.content.clone(),
                }),
            }
        }

        (system_prompt, converted)
    }

    fn authorized(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, &format!("{}{path}", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
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
            timeout_secs = inv.timeout.as_secs(),
            "Invoking Anthropic backend"
        );

        let (system, messages) = Self::convert_messages(&inv.messages);
        let body = AnthropicRequest {
            model: model.clone(),
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            system,
        };
        let request = self
            .authorized(Method::POST, "/v1/messages")
            .header("content-type", "application/json")
            .json(&body);
        let response = self
            .client
            .execute_with_retry(request, inv.timeout, PROVIDER_NAME)
            .await?;

        let parsed: AnthropicResponse = response.json().await.map_err(|e| {
            LlmError::Transport(format!("Failed to parse Anthropic response: {e}"))
        })?;

        let content: String = parsed
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();
        if content.is_empty() {
            return Err(LlmError::Transport(
                "Anthropic response missing text content".to_string(),
            ));
        }

        let mut result = LlmResult::new(content, PROVIDER_NAME, model);
        if let Some(usage) = parsed.usage {
            result = result.with_tokens(usage.input_tokens, usage.output_tokens);
        }
        Ok(result)
    }

    async fn health_check(&self) -> ProviderHealth {
        let started = Instant::now();
        match self.list_models().await {
            Ok(_) => ProviderHealth::healthy(PROVIDER_NAME, started.elapsed()),
            Err(e) => ProviderHealth::unhealthy(PROVIDER_NAME, started.elapsed(), e.to_string()),
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let request = self.authorized(Method::GET, "/v1/models");
        let response = self
            .client
            .execute_with_retry(request, HEALTH_TIMEOUT, PROVIDER_NAME)
            .await?;
        let list: AnthropicModelList = response.json().await.map_err(|e| {
            LlmError::Transport(format!("Failed to parse Anthropic model list: {e}"))
        })?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicModelList {
    #[serde(default)]
    data: Vec<AnthropicModel>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicModel {
    id: String,
}
