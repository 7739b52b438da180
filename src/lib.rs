//! aipo - approval-gated, test-first code generation
//!
//! aipo runs the last stage of a five-stage pipeline (requirements, planning,
//! stories, prompts, code). Before any AI call it checks that every upstream
//! stage is approved, then generates unit tests for one user story, generates
//! the implementation against those tests, checks the output and packages it
//! for human review.
//!
//! aipo can be used in two ways:
//! - **CLI**: `aipo check`, `aipo context`, `aipo generate`, `aipo providers`
//! - **Library**: build a [`GenerationOrchestrator`] with your own
//!   [`PipelineStore`], [`InstructionSource`] and [`GenerationStore`]
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use aipo::{
//!     CliArgs, CodeGenerationRequest, Config, GenerationOrchestrator,
//!     InMemoryGenerationStore, ProviderRegistry, Workspace,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::discover(&CliArgs::default())?;
//! let registry = Arc::new(ProviderRegistry::from_config(&config)?);
//! let workspace = Arc::new(Workspace::load("workspace.json")?);
//! let orchestrator = GenerationOrchestrator::new(
//!     &config,
//!     registry,
//!     workspace.clone(),
//!     workspace,
//!     Arc::new(InMemoryGenerationStore::new()),
//! );
//!
//! let request = CodeGenerationRequest::new(uuid::Uuid::nil(), 0);
//! let result = orchestrator.generate(request, CancellationToken::new()).await?;
//! println!("{} test files, {} implementation files", result.test_files.len(), result.generated_files.len());
//! # Ok(())
//! # }
//! ```
//!
//! # JSON Output
//!
//! Results, manifests and review submissions are emitted as JCS (RFC 8785)
//! canonical JSON. Use [`emit_jcs`] for your own integrations.

pub use aipo_config::{CliArgs, Config};
pub use aipo_engine::{
    ArtifactType, CodeArtifact, CodeGenerationRequest, CodeGenerationResult, ComprehensiveContext,
    DependencyValidationResult, GenerationOrchestrator, GenerationRecord, GenerationState,
    GenerationStore, GenerationWarning, InMemoryGenerationStore, InstructionSource, PackagedArchive,
    PipelineStore, ReviewSubmission, ReviewSubmitter, UserStory,
};
pub use aipo_llm::{LlmBackend, ProviderRegistry};
pub use aipo_utils::canonicalization::emit_jcs;
pub use aipo_utils::error::{AipoError, GenerationError, UserFriendlyError};
pub use aipo_utils::exit_codes::ExitCode;
pub use aipo_utils::types::{ApprovalStatus, Stage};

pub use workspace::{FileReviewQueue, Workspace};

#[must_use]
pub fn aipo_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[doc(hidden)]
pub use aipo_config as config;
#[doc(hidden)]
pub use aipo_engine as engine;
#[doc(hidden)]
pub use aipo_llm as llm;
#[doc(hidden)]
pub use aipo_utils::{canonicalization, error, exit_codes, logging, redaction, types};

#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub use aipo_engine::test_support;

#[doc(hidden)]
pub mod cli;
pub mod workspace;
