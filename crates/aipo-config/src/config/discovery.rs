use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::{CliArgs, Config, ConfigSource, ContextConfig, Defaults, GenerationConfig, LlmConfig};

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    defaults: Option<Defaults>,
    llm: Option<LlmConfig>,
    context: Option<ContextConfig>,
    generation: Option<GenerationConfig>,
}

/// Overwrite `target` when the higher-precedence layer has a value, recording its source.
fn apply<T>(
    target: &mut Option<T>,
    value: Option<T>,
    key: &str,
    source: &ConfigSource,
    attribution: &mut HashMap<String, ConfigSource>,
) {
    if value.is_some() {
        *target = value;
        attribution.insert(key.to_string(), source.clone());
    }
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// The file is the explicit `--config` path, else `$AIPO_HOME/config.toml`
    /// when that exists, else the first `.aipo/config.toml` found walking up
    /// from the current directory.
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = std::env::current_dir().context("Failed to get current directory")?;
        if cli_args.config_path.is_none()
            && let Some(home) = std::env::var_os("AIPO_HOME")
        {
            let home_config = PathBuf::from(home).join("config.toml");
            if home_config.exists() {
                let args = CliArgs {
                    config_path: Some(home_config),
                    ..cli_args.clone()
                };
                return Self::discover_from(&start_dir, &args);
            }
        }
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from a specific directory.
    ///
    /// Path-driven variant of [`Config::discover`] that ignores `AIPO_HOME`.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self> {
        let mut attribution = HashMap::new();
        let mut defaults = Defaults::default();
        let mut llm = LlmConfig::default();
        let mut context = ContextConfig::default();
        let mut generation = GenerationConfig::default();

        for key in [
            "selected_model",
            "timeout_secs",
            "max_related_stories",
            "max_story_chars",
            "max_technical_chars",
            "max_business_chars",
            "technology_stack",
            "instruction_service",
            "default_test_file",
            "default_implementation_file",
            "tests_dir",
            "services_dir",
            "fallback_order",
        ] {
            attribution.insert(key.to_string(), ConfigSource::Defaults);
        }

        let config_path = match &cli_args.config_path {
            Some(explicit) => Some(explicit.clone()),
            None => Self::discover_config_file_from(start_dir)?,
        };

        if let Some(path) = &config_path {
            let file = Self::load_config_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?;
            let source = ConfigSource::ConfigFile(path.clone());
            let attr = &mut attribution;

            if let Some(file_defaults) = file.defaults {
                apply(&mut defaults.selected_model, file_defaults.selected_model, "selected_model", &source, attr);
                apply(&mut defaults.timeout_secs, file_defaults.timeout_secs, "timeout_secs", &source, attr);
            }

            if let Some(file_llm) = file.llm {
                apply(&mut llm.fallback_order, file_llm.fallback_order, "fallback_order", &source, attr);
                apply(&mut llm.nanogpt, file_llm.nanogpt, "llm.nanogpt", &source, attr);
                apply(&mut llm.openrouter, file_llm.openrouter, "llm.openrouter", &source, attr);
                apply(&mut llm.anthropic, file_llm.anthropic, "llm.anthropic", &source, attr);
            }

            if let Some(file_context) = file.context {
                apply(&mut context.max_related_stories, file_context.max_related_stories, "max_related_stories", &source, attr);
                apply(&mut context.max_story_chars, file_context.max_story_chars, "max_story_chars", &source, attr);
                apply(&mut context.max_technical_chars, file_context.max_technical_chars, "max_technical_chars", &source, attr);
                apply(&mut context.max_business_chars, file_context.max_business_chars, "max_business_chars", &source, attr);
                apply(&mut context.technology_stack, file_context.technology_stack, "technology_stack", &source, attr);
            }

            if let Some(file_generation) = file.generation {
                apply(&mut generation.instruction_service, file_generation.instruction_service, "instruction_service", &source, attr);
                apply(&mut generation.default_test_file, file_generation.default_test_file, "default_test_file", &source, attr);
                apply(&mut generation.default_implementation_file, file_generation.default_implementation_file, "default_implementation_file", &source, attr);
                apply(&mut generation.tests_dir, file_generation.tests_dir, "tests_dir", &source, attr);
                apply(&mut generation.services_dir, file_generation.services_dir, "services_dir", &source, attr);
            }
        }

        let cli = ConfigSource::Cli;
        apply(&mut defaults.selected_model, cli_args.selected_model.clone(), "selected_model", &cli, &mut attribution);
        apply(&mut defaults.timeout_secs, cli_args.timeout_secs, "timeout_secs", &cli, &mut attribution);

        let config = Config {
            defaults,
            llm,
            context,
            generation,
            source_attribution: attribution,
            config_path,
        };

        config.validate()?;
        tracing::debug!(
            config_path = ?config.config_path,
            selected_model = %config.selected_model(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Walk up from `start_dir` looking for `.aipo/config.toml`, stopping at
    /// a repository root (.git, .hg, .svn) or the filesystem root.
    pub fn discover_config_file_from(start_dir: &Path) -> Result<Option<PathBuf>> {
        let mut current_dir = start_dir.to_path_buf();

        loop {
            let config_path = current_dir.join(".aipo").join("config.toml");
            if config_path.exists() {
                return Ok(Some(config_path));
            }

            if current_dir.join(".git").exists()
                || current_dir.join(".hg").exists()
                || current_dir.join(".svn").exists()
            {
                break;
            }

            match current_dir.parent() {
                Some(parent) => current_dir = parent.to_path_buf(),
                None => break,
            }
        }

        Ok(None)
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config file: {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                anyhow::bail!("Configuration file not found at {}", path.display())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let config_dir = dir.join(".aipo");
        fs::create_dir_all(&config_dir).unwrap();
        let path = config_dir.join("config.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_config_file() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();

        let config = Config::discover_from(temp.path(), &CliArgs::default()).unwrap();
        assert!(config.config_path.is_none());
        assert_eq!(config.selected_model(), "nanogpt");
        assert_eq!(config.source_of("selected_model"), Some(&ConfigSource::Defaults));
    }

    #[test]
    fn test_config_file_discovered_upward() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        let path = write_config(
            temp.path(),
            r#"
[defaults]
selected_model = "openrouter"

[context]
max_related_stories = 3
technology_stack = ".NET 8"
"#,
        );
        let nested = temp.path().join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();

        let config = Config::discover_from(&nested, &CliArgs::default()).unwrap();
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(config.selected_model(), "openrouter");
        assert_eq!(config.context.max_related_stories(), 3);
        assert_eq!(config.context.technology_stack(), ".NET 8");
        assert_eq!(
            config.source_of("max_related_stories"),
            Some(&ConfigSource::ConfigFile(path))
        );
        // Untouched keys keep their defaults.
        assert_eq!(config.context.max_story_chars(), 1500);
    }

    #[test]
    fn test_cli_overrides_file() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(
            temp.path(),
            "[defaults]\nselected_model = \"openrouter\"\ntimeout_secs = 60\n",
        );

        let args = CliArgs {
            selected_model: Some("anthropic:claude-sonnet-4-20250514".to_string()),
            ..CliArgs::default()
        };
        let config = Config::discover_from(temp.path(), &args).unwrap();
        assert_eq!(config.selected_model(), "anthropic:claude-sonnet-4-20250514");
        assert_eq!(config.source_of("selected_model"), Some(&ConfigSource::Cli));
        assert_eq!(config.defaults.timeout_secs, Some(60));
    }

    #[test]
    fn test_provider_sections_are_loaded() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(
            temp.path(),
            r#"
[llm]
fallback_order = ["anthropic", "nanogpt"]

[llm.nanogpt]
api_key_env = "MY_NANO_KEY"
base_urls = ["http://localhost:9000/api/v1"]
budget = 5
"#,
        );

        let config = Config::discover_from(temp.path(), &CliArgs::default()).unwrap();
        assert_eq!(config.fallback_order(), vec!["anthropic", "nanogpt"]);
        let nano = config.llm.nanogpt.as_ref().unwrap();
        assert_eq!(nano.api_key_env.as_deref(), Some("MY_NANO_KEY"));
        assert_eq!(nano.budget, Some(5));
        assert!(config.llm.openrouter.is_none());
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(temp.path(), "[defaults\nselected_model = ");

        let err = Config::discover_from(temp.path(), &CliArgs::default()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse TOML"));
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let temp = TempDir::new().unwrap();
        let args = CliArgs {
            config_path: Some(temp.path().join("nope.toml")),
            ..CliArgs::default()
        };
        assert!(Config::discover_from(temp.path(), &args).is_err());
    }

    #[test]
    fn test_search_stops_at_repository_root() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "[defaults]\nselected_model = \"openrouter\"\n");
        let repo = temp.path().join("repo");
        fs::create_dir_all(repo.join(".git")).unwrap();

        assert_eq!(Config::discover_config_file_from(&repo).unwrap(), None);
    }
}
