//! Provider registry with ranked fallback
//!
//! Holds every backend constructed at start-up, keyed by lower-case name, and
//! a fixed priority list used when the requested provider is unavailable.
//! The registry never mutates after construction; share it behind an `Arc`.

use crate::anthropic_backend::AnthropicBackend;
use crate::budgeted_backend::BudgetedBackend;
use crate::http_client::HttpClient;
use crate::nanogpt_backend::NanoGptBackend;
use crate::openrouter_backend::OpenRouterBackend;
use crate::types::{LlmBackend, LlmFallbackInfo};
use aipo_config::{Config, KNOWN_PROVIDERS};
use aipo_utils::error::LlmError;
use aipo_utils::redaction::redact_error_message;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The backend chosen for a request, and how it was chosen.
#[derive(Clone)]
pub struct ProviderSelection {
    pub backend: Arc<dyn LlmBackend>,
    /// Registry key of the chosen backend.
    pub provider: String,
    /// Model from a `provider:model` request. Dropped when a fallback is used.
    pub model_override: Option<String>,
    /// Set when the requested provider was not available.
    pub fallback: Option<LlmFallbackInfo>,
}

impl fmt::Debug for ProviderSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSelection")
            .field("provider", &self.provider)
            .field("model_override", &self.model_override)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

/// Split `provider:model` into its parts. Provider names are lower-cased.
#[must_use]
pub fn parse_selected_model(selected_model: &str) -> (String, Option<String>) {
    match selected_model.split_once(':') {
        Some((provider, model)) if !model.trim().is_empty() => (
            provider.trim().to_ascii_lowercase(),
            Some(model.trim().to_string()),
        ),
        Some((provider, _)) => (provider.trim().to_ascii_lowercase(), None),
        None => (selected_model.trim().to_ascii_lowercase(), None),
    }
}

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmBackend>>,
    fallback_order: Vec<String>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .field("fallback_order", &self.fallback_order)
            .finish()
    }
}

impl ProviderRegistry {
    /// Register `backends` under their lower-cased names.
    ///
    /// A later backend with the same name replaces an earlier one.
    pub fn new(backends: Vec<Arc<dyn LlmBackend>>, fallback_order: Vec<String>) -> Self {
        let providers = backends
            .into_iter()
            .map(|backend| (backend.name().to_ascii_lowercase(), backend))
            .collect();
        Self {
            providers,
            fallback_order: fallback_order
                .into_iter()
                .map(|name| name.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Construct every known provider from configuration.
    ///
    /// A provider that fails to construct (typically a missing API key) is
    /// logged and left unregistered. OpenRouter is always budgeted; the
    /// others only when their section sets `budget`.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` only if the shared HTTP client
    /// cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let client = Arc::new(HttpClient::new()?);
        let mut backends: Vec<Arc<dyn LlmBackend>> = Vec::new();

        for name in KNOWN_PROVIDERS {
            match construct_backend(name, config, Arc::clone(&client)) {
                Ok(backend) => {
                    debug!(provider = name, "Registered provider");
                    backends.push(backend);
                }
                Err(e) => warn!(
                    provider = name,
                    reason = %redact_error_message(&e.to_string()),
                    "Provider not registered"
                ),
            }
        }

        let registry = Self::new(backends, config.fallback_order());
        info!(providers = ?registry.names(), "Provider registry initialised");
        Ok(registry)
    }

    /// The backend registered under `name`, matched case-insensitively.
    #[must_use]
    pub fn get_client(&self, name: &str) -> Option<Arc<dyn LlmBackend>> {
        self.providers
            .get(&name.trim().to_ascii_lowercase())
            .cloned()
    }

    /// First registered provider in priority order whose name is not `name`.
    ///
    /// Never returns the provider that was asked for, even if it is
    /// registered. The caller decides liveness by calling it.
    #[must_use]
    pub fn get_fallback(&self, name: &str) -> Option<Arc<dyn LlmBackend>> {
        let requested = name.trim().to_ascii_lowercase();
        self.fallback_order
            .iter()
            .filter(|candidate| **candidate != requested)
            .find_map(|candidate| self.providers.get(candidate).cloned())
    }

    /// Resolve a `provider` or `provider:model` request.
    ///
    /// Tries the named provider first, then [`get_fallback`](Self::get_fallback).
    /// A substitution is recorded in the returned selection.
    #[must_use]
    pub fn resolve(&self, selected_model: &str) -> Option<ProviderSelection> {
        let (provider, model_override) = parse_selected_model(selected_model);

        if let Some(backend) = self.get_client(&provider) {
            return Some(ProviderSelection {
                backend,
                provider,
                model_override,
                fallback: None,
            });
        }

        let backend = self.get_fallback(&provider)?;
        let fallback_name = backend.name().to_ascii_lowercase();
        let info = LlmFallbackInfo {
            requested_provider: provider,
            fallback_provider: fallback_name.clone(),
            reason: "is not registered".to_string(),
        };
        warn!(
            requested = %info.requested_provider,
            fallback = %info.fallback_provider,
            "Requested provider unavailable, using fallback"
        );
        Some(ProviderSelection {
            backend,
            provider: fallback_name,
            model_override: None,
            fallback: Some(info),
        })
    }

    /// Registered names, in fallback order first, then any others sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in &self.fallback_order {
            if self.providers.contains_key(name) && !names.contains(name) {
                names.push(name.clone());
            }
        }
        let mut rest: Vec<String> = self
            .providers
            .keys()
            .filter(|name| !names.contains(name))
            .cloned()
            .collect();
        rest.sort();
        names.extend(rest);
        names
    }

    #[must_use]
    pub fn fallback_order(&self) -> &[String] {
        &self.fallback_order
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Construct a backend for a specific provider, without fallback.
fn construct_backend(
    name: &str,
    config: &Config,
    client: Arc<HttpClient>,
) -> Result<Arc<dyn LlmBackend>, LlmError> {
    match name {
        "nanogpt" => {
            let backend = NanoGptBackend::new_from_config(config, client)?;
            let budget = config.llm.nanogpt.as_ref().and_then(|c| c.budget);
            Ok(maybe_budgeted(Box::new(backend), budget))
        }
        "openrouter" => {
            let backend = OpenRouterBackend::new_from_config(config, client)?;
            let budget = config.llm.openrouter.as_ref().and_then(|c| c.budget);
            Ok(Arc::new(BudgetedBackend::with_limit_from_config(
                Box::new(backend),
                budget,
            )))
        }
        "anthropic" => {
            let backend = AnthropicBackend::new_from_config(config, client)?;
            let budget = config.llm.anthropic.as_ref().and_then(|c| c.budget);
            Ok(maybe_budgeted(Box::new(backend), budget))
        }
        unknown => Err(LlmError::Unsupported(format!(
            "Unknown LLM provider '{unknown}'. Supported providers: {}.",
            KNOWN_PROVIDERS.join(", ")
        ))),
    }
}

fn maybe_budgeted(backend: Box<dyn LlmBackend>, budget: Option<u32>) -> Arc<dyn LlmBackend> {
    match budget {
        Some(limit) => Arc::new(BudgetedBackend::with_limit_from_config(backend, Some(limit))),
        None => Arc::from(backend),
    }
}
