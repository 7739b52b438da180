use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use aipo_utils::error::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// One request to a provider.
///
/// An empty `model` means "the backend's configured default".
#[derive(Debug, Clone)]
pub struct LlmInvocation {
    /// Generation run this call belongs to, for log correlation.
    pub generation_id: String,
    /// Pipeline step that issued the call (`tests`, `implementation`, `health`).
    pub step: String,
    pub model: String,
    pub timeout: Duration,
    pub messages: Vec<Message>,
    /// Per-call overrides such as `max_tokens` and `temperature`.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl LlmInvocation {
    #[must_use]
    pub fn new(
        generation_id: impl Into<String>,
        step: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            generation_id: generation_id.into(),
            step: step.into(),
            model: model.into(),
            timeout,
            messages,
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Total characters across all messages.
    #[must_use]
    pub fn prompt_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }

    pub(crate) fn metadata_u32(&self, key: &str) -> Option<u32> {
        self.metadata
            .get(key)
            .and_then(serde_json::Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn metadata_f32(&self, key: &str) -> Option<f32> {
        self.metadata
            .get(key)
            .and_then(serde_json::Value::as_f64)
            .map(|v| v as f32)
    }
}

/// A successful provider response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResult {
    pub raw_response: String,
    pub provider: String,
    pub model_used: String,
    pub tokens_input: Option<u64>,
    pub tokens_output: Option<u64>,
}

impl LlmResult {
    #[must_use]
    pub fn new(
        raw_response: impl Into<String>,
        provider: impl Into<String>,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            raw_response: raw_response.into(),
            provider: provider.into(),
            model_used: model_used.into(),
            tokens_input: None,
            tokens_output: None,
        }
    }

    #[must_use]
    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.tokens_input = Some(input);
        self.tokens_output = Some(output);
        self
    }
}

/// Outcome of a provider liveness check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub healthy: bool,
    pub latency_ms: u64,
    pub detail: Option<String>,
}

impl ProviderHealth {
    #[must_use]
    pub fn healthy(provider: impl Into<String>, latency: Duration) -> Self {
        Self {
            provider: provider.into(),
            healthy: true,
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            detail: None,
        }
    }

    #[must_use]
    pub fn unhealthy(provider: impl Into<String>, latency: Duration, detail: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            healthy: false,
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            detail: Some(detail.into()),
        }
    }
}

/// Records that a different provider was substituted for the requested one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmFallbackInfo {
    pub requested_provider: String,
    pub fallback_provider: String,
    pub reason: String,
}

impl LlmFallbackInfo {
    /// Warning text for results and logs.
    #[must_use]
    pub fn warning_message(&self) -> String {
        format!(
            "llm_fallback: requested provider '{}' {}; used '{}' instead",
            self.requested_provider, self.reason, self.fallback_provider
        )
    }
}

/// Uniform calling convention over heterogeneous AI backends.
///
/// Backends are registered once at start-up and shared read-only, so every
/// method takes `&self`.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Registry key, lower-case (`nanogpt`, `openrouter`, `anthropic`).
    fn name(&self) -> &str;

    /// Send one completion request.
    ///
    /// # Errors
    ///
    /// Returns `LlmError` for transport failures, provider auth/quota/outage
    /// responses, timeouts and budget exhaustion. Transient failures have
    /// already been retried by the HTTP layer.
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError>;

    /// Check the provider. Never fails; problems are reported in the result.
    async fn health_check(&self) -> ProviderHealth;

    /// Models the provider currently offers.
    async fn list_models(&self) -> Result<Vec<String>, LlmError>;
}
