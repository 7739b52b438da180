use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use aipo_utils::types::ConfigSource;

/// Providers the registry knows how to construct, in default priority order.
pub const KNOWN_PROVIDERS: [&str; 3] = ["nanogpt", "openrouter", "anthropic"];

/// Default per-call timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Configuration for aipo.
///
/// Built by [`Config::discover()`] with precedence CLI arguments > config
/// file > built-in defaults. Every resolved value records where it came from
/// in `source_attribution`, keyed by its TOML key.
///
/// ```rust,no_run
/// use aipo_config::{CliArgs, Config};
///
/// let config = Config::discover(&CliArgs::default())?;
/// println!("Selected model: {}", config.selected_model());
/// println!("Fallback order: {:?}", config.fallback_order());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub defaults: Defaults,
    pub llm: LlmConfig,
    pub context: ContextConfig,
    pub generation: GenerationConfig,
    pub source_attribution: HashMap<String, ConfigSource>,
    /// The file the values were loaded from, if any.
    pub config_path: Option<PathBuf>,
}

/// `[defaults]`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    /// Provider used when a request names none. `provider` or `provider:model`.
    pub selected_model: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// `[llm]`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LlmConfig {
    pub fallback_order: Option<Vec<String>>,
    pub nanogpt: Option<NanoGptConfig>,
    pub openrouter: Option<OpenRouterConfig>,
    pub anthropic: Option<AnthropicConfig>,
}

/// `[llm.nanogpt]`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NanoGptConfig {
    pub api_key_env: Option<String>,
    /// Tried in order until one answers with something other than 404/405.
    pub base_urls: Option<Vec<String>>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub budget: Option<u32>,
}

/// `[llm.openrouter]`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenRouterConfig {
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub budget: Option<u32>,
}

/// `[llm.anthropic]`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AnthropicConfig {
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub budget: Option<u32>,
}

/// `[context]` limits applied by the context assembler.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContextConfig {
    pub max_related_stories: Option<usize>,
    pub max_story_chars: Option<usize>,
    pub max_technical_chars: Option<usize>,
    pub max_business_chars: Option<usize>,
    /// Appended to every technical context as `Technology Stack: <value>`.
    pub technology_stack: Option<String>,
}

/// `[generation]` naming conventions for generated artifacts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    pub instruction_service: Option<String>,
    pub default_test_file: Option<String>,
    pub default_implementation_file: Option<String>,
    pub tests_dir: Option<String>,
    pub services_dir: Option<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            selected_model: Some("nanogpt".to_string()),
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_related_stories: Some(10),
            max_story_chars: Some(1500),
            max_technical_chars: Some(8000),
            max_business_chars: Some(4000),
            technology_stack: Some(".NET 9".to_string()),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            instruction_service: Some("CodeGenerator".to_string()),
            default_test_file: Some("GeneratedTests.cs".to_string()),
            default_implementation_file: Some("GeneratedImplementation.cs".to_string()),
            tests_dir: Some("Tests".to_string()),
            services_dir: Some("Services".to_string()),
        }
    }
}

impl ContextConfig {
    #[must_use]
    pub fn max_related_stories(&self) -> usize {
        self.max_related_stories.unwrap_or(10)
    }

    #[must_use]
    pub fn max_story_chars(&self) -> usize {
        self.max_story_chars.unwrap_or(1500)
    }

    #[must_use]
    pub fn max_technical_chars(&self) -> usize {
        self.max_technical_chars.unwrap_or(8000)
    }

    #[must_use]
    pub fn max_business_chars(&self) -> usize {
        self.max_business_chars.unwrap_or(4000)
    }

    #[must_use]
    pub fn technology_stack(&self) -> &str {
        self.technology_stack.as_deref().unwrap_or(".NET 9")
    }
}

impl GenerationConfig {
    #[must_use]
    pub fn instruction_service(&self) -> &str {
        self.instruction_service.as_deref().unwrap_or("CodeGenerator")
    }

    #[must_use]
    pub fn default_test_file(&self) -> &str {
        self.default_test_file.as_deref().unwrap_or("GeneratedTests.cs")
    }

    #[must_use]
    pub fn default_implementation_file(&self) -> &str {
        self.default_implementation_file
            .as_deref()
            .unwrap_or("GeneratedImplementation.cs")
    }

    #[must_use]
    pub fn tests_dir(&self) -> &str {
        self.tests_dir.as_deref().unwrap_or("Tests")
    }

    #[must_use]
    pub fn services_dir(&self) -> &str {
        self.services_dir.as_deref().unwrap_or("Services")
    }
}
