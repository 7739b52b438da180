//! LLM backend abstraction with ranked provider fallback
//!
//! Every provider implements [`LlmBackend`]. The [`ProviderRegistry`] holds
//! the backends constructed at start-up and picks a substitute, in a fixed
//! priority order, when the requested one is not available.

mod anthropic_backend;
mod budgeted_backend;
mod http_client;
mod nanogpt_backend;
mod openai;
mod openrouter_backend;
mod registry;
mod types;

pub use aipo_utils::error::LlmError;
pub use anthropic_backend::{AnthropicBackend, AnthropicParams};
pub use budgeted_backend::{BUDGET_ENV_VAR, BudgetedBackend, DEFAULT_BUDGET_LIMIT};
pub use http_client::{DEFAULT_MAX_HTTP_TIMEOUT, HttpClient};
pub use nanogpt_backend::{DEFAULT_BASE_URLS, DEFAULT_MODEL, NanoGptBackend, NanoGptParams, completions_url};
pub use openrouter_backend::{HttpParams, OpenRouterBackend};
pub use registry::{ProviderRegistry, ProviderSelection, parse_selected_model};
pub use types::{
    LlmBackend, LlmFallbackInfo, LlmInvocation, LlmResult, Message, ProviderHealth, Role,
};
