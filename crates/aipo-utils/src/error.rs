use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::types::{GenerationStep, Stage};

/// Top-level error type returned to the CLI.
///
/// `AipoError` aggregates the component errors and provides:
/// - Mapping to CLI exit codes via [`ExitCode::from`](crate::exit_codes::ExitCode)
/// - User-friendly messages with context and suggestions via
///   [`display_for_user()`](Self::display_for_user)
///
/// Library code returns the component errors (`GenerationError`, `LlmError`,
/// `ConfigError`) directly and never calls `std::process::exit()`.
#[derive(Error, Debug)]
pub enum AipoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("LLM backend error: {0}")]
    Llm(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workspace file {path} could not be used: {reason}")]
    Workspace { path: String, reason: String },
}

impl AipoError {
    /// Render the error for terminal output with context and suggestions.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let (message, context, suggestions) = match self {
            Self::Config(e) => (e.user_message(), e.context(), e.suggestions()),
            Self::Generation(e) => (e.user_message(), e.context(), e.suggestions()),
            Self::Llm(e) => (e.user_message(), e.context(), e.suggestions()),
            Self::Io(e) => (format!("IO error: {e}"), None, Vec::new()),
            Self::Workspace { path, reason } => (
                format!("Workspace file {path} could not be used: {reason}"),
                Some("The workspace file supplies stories, planning, requirements and instructions.".to_string()),
                vec!["Check that the file exists and is valid JSON".to_string()],
            ),
        };

        format_report(&message, context.as_deref(), &suggestions)
    }
}

/// Render any user-facing error with its context and suggestions.
#[must_use]
pub fn render_for_user<E: UserFriendlyError + ?Sized>(error: &E) -> String {
    format_report(&error.user_message(), error.context().as_deref(), &error.suggestions())
}

fn format_report(message: &str, context: Option<&str>, suggestions: &[String]) -> String {
    let mut out = format!("error: {message}");
    if let Some(context) = context {
        out.push_str(&format!("\n\n  {context}"));
    }
    if !suggestions.is_empty() {
        out.push_str("\n\nsuggestions:");
        for suggestion in suggestions {
            out.push_str(&format!("\n  - {suggestion}"));
        }
    }
    out
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    DependencyChain,
    ProviderIntegration,
    Generation,
    Packaging,
    Cancellation,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::DependencyChain => write!(f, "Dependency Chain"),
            Self::ProviderIntegration => write!(f, "Provider Integration"),
            Self::Generation => write!(f, "Generation"),
            Self::Packaging => write!(f, "Packaging"),
            Self::Cancellation => write!(f, "Cancellation"),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration validation failed: {error_count} errors")]
    ValidationFailed {
        errors: Vec<String>,
        error_count: usize,
    },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::MissingRequired(key) => {
                format!("Required configuration '{key}' is missing")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => {
                format!("Configuration file not found: {path}")
            }
            Self::ValidationFailed { errors, .. } => {
                format!(
                    "Configuration validation failed with {} errors: {}",
                    errors.len(),
                    errors.join(", ")
                )
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) => Some(
                "Configuration files must be valid TOML with [defaults], [llm], [context] and [generation] sections."
                    .to_string(),
            ),
            Self::NotFound { .. } => Some(
                "aipo searches for .aipo/config.toml starting from the current directory upward."
                    .to_string(),
            ),
            Self::MissingRequired(_) | Self::InvalidValue { .. } | Self::ValidationFailed { .. } => {
                None
            }
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax using a TOML validator".to_string(),
                "Compare with the example configuration in the README".to_string(),
            ],
            Self::MissingRequired(key) => vec![format!(
                "Add '{key}' to .aipo/config.toml or pass it on the command line"
            )],
            Self::InvalidValue { key, .. } => match key.as_str() {
                "fallback_order" | "selected_model" => vec![
                    "Use one of the supported providers: nanogpt, openrouter, anthropic".to_string(),
                ],
                _ => vec![
                    "Check the documentation for valid values for this option".to_string(),
                    "Remove the option to use the default value".to_string(),
                ],
            },
            Self::NotFound { .. } => vec![
                "Create .aipo/config.toml in your project root".to_string(),
                "Use --config <path> to specify the file explicitly".to_string(),
            ],
            Self::ValidationFailed { .. } => {
                vec!["Review each listed error in the configuration file".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// LLM provider errors.
///
/// Retries for transient failures happen inside the HTTP layer; by the time
/// one of these reaches a generator it is final for that call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Transport-level failure (HTTP connectivity, malformed payloads)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// Invocation timed out
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Call budget exhausted for this process
    #[error("Budget exceeded: attempted {attempted} calls, limit is {limit}")]
    BudgetExceeded { limit: u32, attempted: u32 },

    /// Every configured endpoint answered 404/405
    #[error("All endpoint configurations failed for {provider}: tried {tried}")]
    EndpointNotFound { provider: String, tried: usize },

    /// Configuration error
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// Unsupported feature or provider
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl UserFriendlyError for LlmError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("LLM transport error: {msg}"),
            Self::ProviderAuth(msg) => format!("LLM provider authentication failed: {msg}"),
            Self::ProviderQuota(msg) => format!("LLM provider quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("LLM provider service outage: {msg}"),
            Self::Timeout { duration } => {
                format!("LLM invocation timed out after {duration:?}")
            }
            Self::BudgetExceeded { limit, attempted } => {
                format!("LLM budget exceeded: attempted {attempted} calls, limit is {limit}")
            }
            Self::EndpointNotFound { provider, tried } => format!(
                "No working API endpoint found for {provider} after trying {tried} configurations"
            ),
            Self::Misconfiguration(msg) => format!("LLM configuration error: {msg}"),
            Self::Unsupported(msg) => format!("LLM feature not supported: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Transport(_) => {
                Some("Transport errors occur when the LLM provider cannot be reached.".to_string())
            }
            Self::ProviderAuth(_) => Some(
                "Authentication errors indicate missing or invalid API keys.".to_string(),
            ),
            Self::ProviderQuota(_) => Some(
                "Quota errors occur when rate limits or usage limits are exceeded.".to_string(),
            ),
            Self::ProviderOutage(_) => {
                Some("Provider outages are temporary service disruptions.".to_string())
            }
            Self::Timeout { .. } => Some(
                "Large generation prompts can take several minutes to complete.".to_string(),
            ),
            Self::BudgetExceeded { .. } => {
                Some("Budget limits prevent excessive LLM API calls and costs.".to_string())
            }
            Self::EndpointNotFound { .. } => Some(
                "The provider may be down or its API format may have changed.".to_string(),
            ),
            Self::Misconfiguration(_) | Self::Unsupported(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Transport(_) | Self::EndpointNotFound { .. } => vec![
                "Verify network connectivity to the provider".to_string(),
                "Run 'aipo providers --health' to check every configured provider".to_string(),
            ],
            Self::ProviderAuth(_) => vec![
                "Check that the required API key environment variable is set".to_string(),
                "Verify the API key is valid and not expired".to_string(),
            ],
            Self::ProviderQuota(_) | Self::ProviderOutage(_) => vec![
                "Wait a few minutes and try again".to_string(),
                "Select a different provider with --model".to_string(),
            ],
            Self::Timeout { .. } => vec![
                "Increase [defaults] timeout_secs in .aipo/config.toml".to_string(),
                "Reduce [context] limits to shrink the prompt".to_string(),
            ],
            Self::BudgetExceeded { .. } => vec![
                "Raise the provider's budget in configuration or via AIPO_LLM_BUDGET".to_string(),
            ],
            Self::Misconfiguration(_) => {
                vec!["Review the [llm] section of .aipo/config.toml".to_string()]
            }
            Self::Unsupported(_) => {
                vec!["Use one of: nanogpt, openrouter, anthropic".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::ProviderIntegration
    }
}

/// Fatal outcomes of a code generation run.
///
/// Malformed AI output is deliberately absent: it degrades to a best-effort
/// artifact inside the generator and is reported as a warning instead.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// The upstream approval chain is broken
    #[error("Cannot run {stage}: {broken_stage} is not satisfied: {message}")]
    ValidationFailure {
        stage: Stage,
        broken_stage: Stage,
        message: String,
    },

    /// No provider could be resolved for the requested model or its fallbacks
    #[error("No AI provider available for '{requested}': {reason}")]
    ProviderUnavailable { requested: String, reason: String },

    /// The AI call for a generation step returned an error
    #[error("{step} generation failed via provider '{provider}': {source}")]
    GenerationFailure {
        step: GenerationStep,
        provider: String,
        source: LlmError,
    },

    /// The instruction template is missing or invalid
    #[error("Instruction '{service}' is missing or invalid")]
    InstructionUnavailable { service: String },

    /// Upstream artifacts could not be assembled into a context bundle
    #[error("Context assembly failed: {reason}")]
    ContextAssembly { reason: String },

    /// Serializing or zipping the artifacts failed
    #[error("Packaging failed: {reason}")]
    PackagingFailure { reason: String },

    /// The caller cancelled the run
    #[error("Generation cancelled during {state}")]
    Cancelled { state: String },

    /// No record exists for the generation id
    #[error("Generation {id} not found")]
    NotFound { id: String },
}

impl GenerationError {
    /// Name of the component that produced the error.
    #[must_use]
    pub const fn component(&self) -> &'static str {
        match self {
            Self::ValidationFailure { .. } => "dependency-validator",
            Self::ProviderUnavailable { .. } => "provider-registry",
            Self::GenerationFailure {
                step: GenerationStep::Tests,
                ..
            } => "test-generator",
            Self::GenerationFailure {
                step: GenerationStep::Implementation,
                ..
            } => "implementation-generator",
            Self::InstructionUnavailable { .. } => "instruction-source",
            Self::ContextAssembly { .. } => "context-assembler",
            Self::PackagingFailure { .. } => "file-organizer",
            Self::Cancelled { .. } => "orchestrator",
            Self::NotFound { .. } => "generation-store",
        }
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl UserFriendlyError for GenerationError {
    fn user_message(&self) -> String {
        match self {
            Self::ValidationFailure {
                stage,
                broken_stage,
                message,
            } => format!("{stage} is blocked by {broken_stage}: {message}"),
            Self::ProviderUnavailable { requested, reason } => {
                format!("No AI provider could be used for '{requested}': {reason}")
            }
            Self::GenerationFailure {
                step,
                provider,
                source,
            } => format!(
                "{step} generation failed on provider '{provider}': {}",
                source.user_message()
            ),
            Self::InstructionUnavailable { service } => {
                format!("Instruction template '{service}' is missing or invalid")
            }
            Self::ContextAssembly { reason } => format!("Could not assemble context: {reason}"),
            Self::PackagingFailure { reason } => format!("Could not package artifacts: {reason}"),
            Self::Cancelled { state } => format!("Generation was cancelled during {state}"),
            Self::NotFound { id } => format!("No generation with id {id}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::ValidationFailure { .. } => Some(
                "Every upstream stage must be approved before code can be generated.".to_string(),
            ),
            Self::GenerationFailure { source, .. } => source.context(),
            Self::Cancelled { .. } => {
                Some("No partial artifacts were kept from the cancelled run.".to_string())
            }
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ValidationFailure { broken_stage, .. } => vec![
                format!("Complete and approve {broken_stage} before retrying"),
                "Run 'aipo check' to inspect the approval chain".to_string(),
            ],
            Self::ProviderUnavailable { .. } => vec![
                "Run 'aipo providers' to list registered providers".to_string(),
                "Check the provider API key environment variables".to_string(),
            ],
            Self::GenerationFailure { source, .. } => source.suggestions(),
            Self::InstructionUnavailable { service } => {
                vec![format!("Add a valid '{service}' instruction to the workspace")]
            }
            Self::ContextAssembly { .. } => {
                vec!["Check the story index against the number of approved stories".to_string()]
            }
            Self::PackagingFailure { .. } | Self::Cancelled { .. } | Self::NotFound { .. } => {
                Vec::new()
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationFailure { .. } => ErrorCategory::DependencyChain,
            Self::ProviderUnavailable { .. } => ErrorCategory::ProviderIntegration,
            Self::GenerationFailure { .. }
            | Self::InstructionUnavailable { .. }
            | Self::ContextAssembly { .. }
            | Self::NotFound { .. } => ErrorCategory::Generation,
            Self::PackagingFailure { .. } => ErrorCategory::Packaging,
            Self::Cancelled { .. } => ErrorCategory::Cancellation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_identifies_failing_step() {
        let err = GenerationError::GenerationFailure {
            step: GenerationStep::Implementation,
            provider: "nanogpt".to_string(),
            source: LlmError::ProviderOutage("503".to_string()),
        };
        assert_eq!(err.component(), "implementation-generator");

        let err = GenerationError::ValidationFailure {
            stage: Stage::CodeGeneration,
            broken_stage: Stage::ProjectPlanning,
            message: "planning is draft".to_string(),
        };
        assert_eq!(err.component(), "dependency-validator");
        assert!(err.to_string().contains("Project Planning"));
    }

    #[test]
    fn test_generation_failure_exposes_source() {
        use std::error::Error;

        let err = GenerationError::GenerationFailure {
            step: GenerationStep::Tests,
            provider: "openrouter".to_string(),
            source: LlmError::ProviderQuota("429".to_string()),
        };
        let source = err.source().expect("source should be set");
        assert!(source.to_string().contains("429"));
    }

    #[test]
    fn test_display_for_user_includes_suggestions() {
        let err = AipoError::Generation(GenerationError::ValidationFailure {
            stage: Stage::CodeGeneration,
            broken_stage: Stage::StoryGeneration,
            message: "no approved stories".to_string(),
        });
        let rendered = err.display_for_user();
        assert!(rendered.starts_with("error: "));
        assert!(rendered.contains("Story Generation"));
        assert!(rendered.contains("aipo check"));
    }

    #[test]
    fn test_cancelled_is_not_a_failure_category() {
        let err = GenerationError::Cancelled {
            state: "generating-tests".to_string(),
        };
        assert!(err.is_cancelled());
        assert_eq!(err.category(), ErrorCategory::Cancellation);
    }
}
