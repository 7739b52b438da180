use aipo_utils::error::ConfigError;

use super::{Config, KNOWN_PROVIDERS};

fn is_known_provider(name: &str) -> bool {
    KNOWN_PROVIDERS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(name.trim()))
}

impl Config {
    /// Validate configuration values, collecting every problem found.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let selected = self.selected_model();
        let provider = selected.split_once(':').map_or(selected, |(p, _)| p);
        if !is_known_provider(provider) {
            errors.push(format!(
                "selected_model: unknown provider '{provider}' (expected one of {})",
                KNOWN_PROVIDERS.join(", ")
            ));
        }

        if let Some(timeout) = self.defaults.timeout_secs
            && !(1..=3600).contains(&timeout)
        {
            errors.push("timeout_secs: must be between 1 and 3600 seconds".to_string());
        }

        if let Some(order) = &self.llm.fallback_order {
            for name in order {
                if !is_known_provider(name) {
                    errors.push(format!("fallback_order: unknown provider '{name}'"));
                }
            }
        }

        for (key, value) in [
            ("max_related_stories", self.context.max_related_stories),
            ("max_story_chars", self.context.max_story_chars),
            ("max_technical_chars", self.context.max_technical_chars),
            ("max_business_chars", self.context.max_business_chars),
        ] {
            if value == Some(0) {
                errors.push(format!("{key}: must be greater than 0"));
            }
        }

        for (key, value) in [
            ("instruction_service", &self.generation.instruction_service),
            ("default_test_file", &self.generation.default_test_file),
            ("default_implementation_file", &self.generation.default_implementation_file),
            ("tests_dir", &self.generation.tests_dir),
            ("services_dir", &self.generation.services_dir),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                errors.push(format!("{key}: must not be empty"));
            }
        }

        for (key, value) in [
            ("tests_dir", &self.generation.tests_dir),
            ("services_dir", &self.generation.services_dir),
        ] {
            if value
                .as_deref()
                .is_some_and(|v| v.contains("..") || v.starts_with('/') || v.starts_with('\\'))
            {
                errors.push(format!("{key}: must be a relative path without '..'"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed {
                error_count: errors.len(),
                errors,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_is_valid() {
        assert!(Config::minimal_for_testing().validate().is_ok());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut config = Config::minimal_for_testing();
        config.defaults.selected_model = Some("gemini".to_string());
        config.llm.fallback_order = Some(vec!["nanogpt".to_string(), "cohere".to_string()]);

        match config.validate() {
            Err(ConfigError::ValidationFailed { errors, error_count }) => {
                assert_eq!(error_count, 2);
                assert!(errors.iter().any(|e| e.contains("gemini")));
                assert!(errors.iter().any(|e| e.contains("cohere")));
            }
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_provider_with_model_suffix_accepted() {
        let mut config = Config::minimal_for_testing();
        config.defaults.selected_model = Some("OpenRouter:google/gemini-2.5-flash".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_limits_and_empty_dirs_rejected() {
        let mut config = Config::minimal_for_testing();
        config.context.max_story_chars = Some(0);
        config.generation.tests_dir = Some("  ".to_string());
        config.generation.services_dir = Some("../escape".to_string());

        let Err(ConfigError::ValidationFailed { error_count, .. }) = config.validate() else {
            panic!("expected validation failure");
        };
        assert_eq!(error_count, 3);
    }
}
