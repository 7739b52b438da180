//! Fallback selection properties of the provider registry.

use aipo_llm::{
    LlmBackend, LlmError, LlmInvocation, LlmResult, ProviderHealth, ProviderRegistry,
};
use async_trait::async_trait;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

struct Stub(String);

#[async_trait]
impl LlmBackend for Stub {
    fn name(&self) -> &str {
        &self.0
    }

    async fn invoke(&self, _inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        Ok(LlmResult::new("", self.0.clone(), "stub"))
    }

    async fn health_check(&self) -> ProviderHealth {
        ProviderHealth::healthy(self.0.clone(), Duration::ZERO)
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        Ok(Vec::new())
    }
}

const POOL: [&str; 5] = ["nanogpt", "openrouter", "anthropic", "local", "backup"];

/// Random casing of a provider name.
fn cased(name: &'static str) -> impl Strategy<Value = String> {
    proptest::collection::vec(any::<bool>(), name.len()).prop_map(move |flags| {
        name.chars()
            .zip(flags)
            .map(|(c, upper)| if upper { c.to_ascii_uppercase() } else { c })
            .collect()
    })
}

proptest! {
    #[test]
    fn fallback_never_returns_requested_provider(
        order in proptest::sample::subsequence(POOL.to_vec(), 0..=POOL.len()).prop_shuffle(),
        registered in proptest::sample::subsequence(POOL.to_vec(), 0..=POOL.len()),
        requested_idx in 0..POOL.len(),
        upper in any::<bool>(),
    ) {
        let backends = registered
            .iter()
            .map(|name| Arc::new(Stub((*name).to_string())) as Arc<dyn LlmBackend>)
            .collect();
        let registry = ProviderRegistry::new(
            backends,
            order.iter().map(|s| (*s).to_string()).collect(),
        );

        let requested = if upper {
            POOL[requested_idx].to_ascii_uppercase()
        } else {
            POOL[requested_idx].to_string()
        };

        let expected = order
            .iter()
            .find(|name| !name.eq_ignore_ascii_case(&requested) && registered.contains(name))
            .copied();

        match registry.get_fallback(&requested) {
            Some(backend) => {
                prop_assert!(!backend.name().eq_ignore_ascii_case(&requested));
                prop_assert_eq!(Some(backend.name()), expected);
            }
            None => prop_assert!(expected.is_none()),
        }
    }

    #[test]
    fn get_client_ignores_case(name in cased("openrouter")) {
        let registry = ProviderRegistry::new(
            vec![Arc::new(Stub("openrouter".to_string())) as Arc<dyn LlmBackend>],
            vec!["openrouter".to_string()],
        );
        prop_assert!(registry.get_client(&name).is_some());
        prop_assert!(registry.get_fallback(&name).is_none());
    }
}
