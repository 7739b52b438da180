//! Foundation utilities for aipo
//!
//! Shared by every other crate in the workspace: pipeline stage identifiers,
//! the error taxonomy, exit codes, structured logging and canonical JSON.

pub mod canonicalization;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod redaction;
pub mod types;

pub use canonicalization::{content_digest, emit_jcs};
pub use error::{AipoError, ConfigError, GenerationError, LlmError, UserFriendlyError};
pub use exit_codes::ExitCode;
pub use types::{ApprovalStatus, GenerationStep, Stage};
