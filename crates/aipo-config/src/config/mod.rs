mod discovery;
mod model;
mod validation;

pub use aipo_utils::types::ConfigSource;
pub use model::*;

use std::path::PathBuf;
use std::time::Duration;

/// Values supplied on the command line. `None` leaves the file or default in place.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub selected_model: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// The provider (or `provider:model`) used when a request names none.
    #[must_use]
    pub fn selected_model(&self) -> &str {
        self.defaults.selected_model.as_deref().unwrap_or(KNOWN_PROVIDERS[0])
    }

    /// Per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.defaults.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Provider priority list, lower-cased. Falls back to [`KNOWN_PROVIDERS`].
    #[must_use]
    pub fn fallback_order(&self) -> Vec<String> {
        match &self.llm.fallback_order {
            Some(order) if !order.is_empty() => {
                order.iter().map(|name| name.trim().to_ascii_lowercase()).collect()
            }
            _ => KNOWN_PROVIDERS.iter().map(|name| (*name).to_string()).collect(),
        }
    }

    /// Where `key` was resolved from, if it is tracked.
    #[must_use]
    pub fn source_of(&self, key: &str) -> Option<&ConfigSource> {
        self.source_attribution.get(key)
    }

    /// Built-in defaults only, with no file and no CLI values.
    #[cfg(any(test, feature = "test-utils"))]
    #[must_use]
    pub fn minimal_for_testing() -> Self {
        Config {
            defaults: Defaults::default(),
            llm: LlmConfig::default(),
            context: ContextConfig::default(),
            generation: GenerationConfig::default(),
            source_attribution: std::collections::HashMap::new(),
            config_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_order_defaults_to_known_providers() {
        let config = Config::minimal_for_testing();
        assert_eq!(
            config.fallback_order(),
            vec!["nanogpt", "openrouter", "anthropic"]
        );
    }

    #[test]
    fn test_fallback_order_is_lowercased() {
        let mut config = Config::minimal_for_testing();
        config.llm.fallback_order = Some(vec!["OpenRouter".to_string(), " NanoGPT ".to_string()]);
        assert_eq!(config.fallback_order(), vec!["openrouter", "nanogpt"]);
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::minimal_for_testing();
        assert_eq!(config.selected_model(), "nanogpt");
        assert_eq!(config.timeout(), Duration::from_secs(300));
        assert_eq!(config.context.technology_stack(), ".NET 9");
        assert_eq!(config.context.max_related_stories(), 10);
        assert_eq!(
            config.generation.default_implementation_file(),
            "GeneratedImplementation.cs"
        );
        assert_eq!(config.generation.instruction_service(), "CodeGenerator");
    }
}
