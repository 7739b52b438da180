//! Call-budget wrapper for any `LlmBackend`

use crate::types::{LlmBackend, LlmInvocation, LlmResult, ProviderHealth};
use aipo_utils::error::LlmError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

/// Default budget limit per process
pub const DEFAULT_BUDGET_LIMIT: u32 = 20;

/// Environment variable for overriding the budget limit
pub const BUDGET_ENV_VAR: &str = "AIPO_LLM_BUDGET";

/// Wraps a backend and refuses calls past `limit`.
///
/// The counter tracks attempted calls, not successful ones: a failed call
/// still consumes its slot. Health checks and model listings are free.
pub struct BudgetedBackend {
    inner: Box<dyn LlmBackend>,
    calls: AtomicU32,
    limit: u32,
}

impl BudgetedBackend {
    pub fn new(inner: Box<dyn LlmBackend>, limit: u32) -> Self {
        debug!(provider = inner.name(), limit = limit, "Creating BudgetedBackend");
        Self {
            inner,
            calls: AtomicU32::new(0),
            limit,
        }
    }

    /// Limit precedence: `AIPO_LLM_BUDGET` > config `budget` > default (20).
    pub fn with_limit_from_config(inner: Box<dyn LlmBackend>, config_budget: Option<u32>) -> Self {
        let env_budget = std::env::var(BUDGET_ENV_VAR)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok());
        let limit = resolve_limit(env_budget, config_budget);
        if env_budget.is_some() {
            debug!(limit = limit, "Using budget limit from {}", BUDGET_ENV_VAR);
        }
        Self::new(inner, limit)
    }

    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }
}

fn resolve_limit(env_budget: Option<u32>, config_budget: Option<u32>) -> u32 {
    env_budget.or(config_budget).unwrap_or(DEFAULT_BUDGET_LIMIT)
}

#[async_trait]
impl LlmBackend for BudgetedBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let current = self.calls.fetch_add(1, Ordering::SeqCst);
        if current >= self.limit {
            let attempted = current + 1;
            warn!(
                provider = self.inner.name(),
                limit = self.limit,
                attempted = attempted,
                "Budget limit exceeded"
            );
            return Err(LlmError::BudgetExceeded {
                limit: self.limit,
                attempted,
            });
        }

        let result = self.inner.invoke(inv).await;
        if let Err(e) = &result {
            debug!(
                provider = self.inner.name(),
                call_count = current + 1,
                error = %e,
                "Inner backend invocation failed (budget slot still consumed)"
            );
        }
        result
    }

    async fn health_check(&self) -> ProviderHealth {
        self.inner.health_check().await
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        self.inner.list_models().await
    }
}
