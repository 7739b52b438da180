//! Exit code constants and error mapping for aipo.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Operation completed successfully |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `VALIDATION_FAILED` | Upstream approval chain is broken |
//! | 4 | `PROVIDER_UNAVAILABLE` | No AI provider could be resolved |
//! | 5 | `GENERATION_FAILED` | An AI generation step failed |
//! | 6 | `PACKAGING_FAILED` | Artifacts could not be serialized or zipped |
//! | 130 | `CANCELLED` | Run cancelled by the user |

use crate::error::{AipoError, GenerationError, LlmError};

/// Process exit code.
///
/// The numeric values are part of the CLI contract.
///
/// ```rust
/// use aipo_utils::ExitCode;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::CANCELLED, ExitCode::from_i32(130));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - operation completed successfully
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments or configuration error
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// Dependency validation failed before any AI call
    pub const VALIDATION_FAILED: ExitCode = ExitCode(3);

    /// Neither the requested provider nor any fallback is registered
    pub const PROVIDER_UNAVAILABLE: ExitCode = ExitCode(4);

    /// Test or implementation generation failed
    pub const GENERATION_FAILED: ExitCode = ExitCode(5);

    /// Serialization or packaging failed
    pub const PACKAGING_FAILED: ExitCode = ExitCode(6);

    /// Cancelled (matches the shell convention for SIGINT)
    pub const CANCELLED: ExitCode = ExitCode(130);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

impl From<&GenerationError> for ExitCode {
    fn from(error: &GenerationError) -> Self {
        match error {
            GenerationError::ValidationFailure { .. } => ExitCode::VALIDATION_FAILED,
            GenerationError::ProviderUnavailable { .. } => ExitCode::PROVIDER_UNAVAILABLE,
            GenerationError::GenerationFailure { .. }
            | GenerationError::InstructionUnavailable { .. }
            | GenerationError::ContextAssembly { .. } => ExitCode::GENERATION_FAILED,
            GenerationError::PackagingFailure { .. } => ExitCode::PACKAGING_FAILED,
            GenerationError::Cancelled { .. } => ExitCode::CANCELLED,
            GenerationError::NotFound { .. } => ExitCode::CLI_ARGS,
        }
    }
}

impl From<&LlmError> for ExitCode {
    fn from(error: &LlmError) -> Self {
        match error {
            LlmError::Misconfiguration(_) | LlmError::Unsupported(_) => ExitCode::CLI_ARGS,
            _ => ExitCode::PROVIDER_UNAVAILABLE,
        }
    }
}

impl From<&AipoError> for ExitCode {
    fn from(error: &AipoError) -> Self {
        match error {
            AipoError::Config(_) => ExitCode::CLI_ARGS,
            AipoError::Generation(e) => ExitCode::from(e),
            AipoError::Llm(e) => ExitCode::from(e),
            AipoError::Workspace { .. } => ExitCode::CLI_ARGS,
            AipoError::Io(_) => ExitCode::INTERNAL,
        }
    }
}

impl AipoError {
    /// Map this error to the process exit code.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::types::{GenerationStep, Stage};

    #[test]
    fn test_exit_code_values_are_stable() {
        assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
        assert_eq!(ExitCode::INTERNAL.as_i32(), 1);
        assert_eq!(ExitCode::CLI_ARGS.as_i32(), 2);
        assert_eq!(ExitCode::VALIDATION_FAILED.as_i32(), 3);
        assert_eq!(ExitCode::PROVIDER_UNAVAILABLE.as_i32(), 4);
        assert_eq!(ExitCode::GENERATION_FAILED.as_i32(), 5);
        assert_eq!(ExitCode::PACKAGING_FAILED.as_i32(), 6);
        assert_eq!(ExitCode::CANCELLED.as_i32(), 130);
    }

    #[test]
    fn test_generation_errors_map_to_distinct_codes() {
        let validation = AipoError::Generation(GenerationError::ValidationFailure {
            stage: Stage::CodeGeneration,
            broken_stage: Stage::StoryGeneration,
            message: "empty".to_string(),
        });
        assert_eq!(validation.to_exit_code(), ExitCode::VALIDATION_FAILED);

        let failure = AipoError::Generation(GenerationError::GenerationFailure {
            step: GenerationStep::Tests,
            provider: "nanogpt".to_string(),
            source: LlmError::Transport("reset".to_string()),
        });
        assert_eq!(failure.to_exit_code(), ExitCode::GENERATION_FAILED);

        let cancelled = AipoError::Generation(GenerationError::Cancelled {
            state: "assembling-context".to_string(),
        });
        assert_eq!(cancelled.to_exit_code(), ExitCode::CANCELLED);
    }

    #[test]
    fn test_config_error_maps_to_cli_args() {
        let err = AipoError::Config(ConfigError::InvalidFile("bad toml".to_string()));
        assert_eq!(err.to_exit_code(), ExitCode::CLI_ARGS);
    }
}
