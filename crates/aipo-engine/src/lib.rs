//! Test-first code generation core
//!
//! [`GenerationOrchestrator`] gates each request on the upstream approval
//! chain, assembles a bounded context, generates tests and then an
//! implementation written against them, checks syntax, and packages the
//! result for review. Persistence lives behind the traits in [`ports`].

pub mod code_validator;
pub mod context;
pub mod dependency;
pub mod generator;
pub mod orchestrator;
pub mod organizer;
pub mod parse;
pub mod ports;
pub mod state;
pub mod store;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use code_validator::{CodeValidator, FileValidation, SyntaxIssue};
pub use context::{ContextAssembler, ContextLimits};
pub use dependency::{DependencyValidationResult, DependencyValidator};
pub use generator::{GenerationOutput, GeneratorSettings, ImplementationGenerator, TestGenerator};
pub use orchestrator::GenerationOrchestrator;
pub use organizer::{FileOrganizer, OrganizerLayout, PackagedArchive};
pub use parse::{ParsedResponse, parse_code_blocks};
pub use ports::{Instruction, InstructionSource, PipelineStore, ReviewSubmission, ReviewSubmitter};
pub use state::{GenerationState, StateMachine, StateTransition, TransitionError};
pub use store::{GenerationRecord, GenerationStore, InMemoryGenerationStore};
pub use types::{
    ArtifactType, CodeArtifact, CodeGenerationContext, CodeGenerationRequest,
    CodeGenerationResult, ComprehensiveContext, GenerationWarning, UserStory,
};
