//! Generation orchestrator
//!
//! Runs one generation request through the fixed step order:
//!
//! 1. validate the approval chain (no AI call happens unless it holds)
//! 2. load the instruction and assemble context
//! 3. generate tests
//! 4. generate the implementation against those tests
//! 5. check syntax (flag and continue)
//! 6. organize and package
//!
//! Steps run sequentially inside one task. Each step races the caller's
//! [`CancellationToken`]; cancellation drops the in-flight step and is
//! reported as [`GenerationError::Cancelled`], never as a failure. A run
//! that does not reach `PendingReview` keeps its record but no artifacts.

use aipo_config::Config;
use aipo_llm::ProviderRegistry;
use aipo_utils::error::GenerationError;
use aipo_utils::logging::{generation_span, log_stage_complete, log_stage_error, log_stage_start};
use aipo_utils::types::{GenerationId, Stage, StoryGenerationId};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::code_validator::CodeValidator;
use crate::context::{ContextAssembler, ContextLimits};
use crate::dependency::{DependencyValidationResult, DependencyValidator};
use crate::generator::{GeneratorSettings, ImplementationGenerator, TestGenerator};
use crate::organizer::{FileOrganizer, OrganizerLayout, PackagedArchive};
use crate::ports::{InstructionSource, PipelineStore};
use crate::state::{GenerationState, StateMachine};
use crate::store::{GenerationRecord, GenerationStore};
use crate::types::{
    CodeArtifact, CodeGenerationContext, CodeGenerationRequest, CodeGenerationResult,
    GenerationWarning,
};

/// Bookkeeping for one run: state machine, store mirror and cancellation.
struct Run {
    id: GenerationId,
    machine: StateMachine,
    store: Arc<dyn GenerationStore>,
    cancel: CancellationToken,
}

impl Run {
    fn advance(&mut self, to: GenerationState) {
        match self.machine.transition(to) {
            Ok(transition) => {
                let transition = transition.clone();
                self.store.record_transition(self.id, transition);
            }
            Err(e) => error!(generation_id = %self.id, error = %e, "Rejected state transition"),
        }
    }

    /// Enter `state` and drive `step` to completion unless cancelled first.
    async fn step<T, F>(&mut self, state: GenerationState, step: F) -> Result<T, GenerationError>
    where
        F: Future<Output = Result<T, GenerationError>>,
    {
        self.advance(state);
        let id = self.id.to_string();
        log_stage_start(&id, state.as_str());
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(GenerationError::Cancelled {
                state: state.to_string(),
            }),
            result = step => result,
        };

        let elapsed = started.elapsed().as_millis();
        match &outcome {
            Ok(_) => log_stage_complete(&id, state.as_str(), elapsed),
            Err(e) if e.is_cancelled() => {
                warn!(generation_id = %id, stage = state.as_str(), "Generation stage cancelled");
            }
            Err(e) => log_stage_error(&id, state.as_str(), &e.to_string(), elapsed),
        }
        outcome
    }
}

pub struct GenerationOrchestrator {
    validator: DependencyValidator,
    assembler: ContextAssembler,
    instructions: Arc<dyn InstructionSource>,
    test_generator: TestGenerator,
    implementation_generator: ImplementationGenerator,
    code_validator: CodeValidator,
    organizer: FileOrganizer,
    store: Arc<dyn GenerationStore>,
    instruction_service: String,
    default_model: String,
}

impl GenerationOrchestrator {
    /// Wire the components from configuration and the injected collaborators.
    pub fn new(
        config: &Config,
        registry: Arc<ProviderRegistry>,
        pipeline: Arc<dyn PipelineStore>,
        instructions: Arc<dyn InstructionSource>,
        store: Arc<dyn GenerationStore>,
    ) -> Self {
        let timeout = config.timeout();
        let generation = &config.generation;
        Self {
            validator: DependencyValidator::new(Arc::clone(&pipeline)),
            assembler: ContextAssembler::new(pipeline, ContextLimits::from(&config.context)),
            instructions,
            test_generator: TestGenerator::new(
                Arc::clone(&registry),
                GeneratorSettings {
                    timeout,
                    default_file_name: generation.default_test_file().to_string(),
                },
            ),
            implementation_generator: ImplementationGenerator::new(
                registry,
                GeneratorSettings {
                    timeout,
                    default_file_name: generation.default_implementation_file().to_string(),
                },
            ),
            code_validator: CodeValidator::new(),
            organizer: FileOrganizer::new(OrganizerLayout::from(generation)),
            store,
            instruction_service: generation.instruction_service().to_string(),
            default_model: config.selected_model().to_string(),
        }
    }

    #[must_use]
    pub fn validator(&self) -> &DependencyValidator {
        &self.validator
    }

    #[must_use]
    pub fn context_assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    #[must_use]
    pub fn organizer(&self) -> &FileOrganizer {
        &self.organizer
    }

    /// Whether the approval chain for `story_generation_id` currently holds.
    pub async fn can_generate(&self, story_generation_id: StoryGenerationId) -> bool {
        self.validator
            .validate(story_generation_id, Stage::CodeGeneration)
            .await
            .is_valid
    }

    /// Run one generation request to `PendingReview`.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error from any step, identifying the failing
    /// component, or `Cancelled` if `cancel` fires first. Malformed AI output
    /// and syntax issues are warnings on the result, not errors.
    pub async fn generate(
        &self,
        request: CodeGenerationRequest,
        cancel: CancellationToken,
    ) -> Result<CodeGenerationResult, GenerationError> {
        let generation_id = Uuid::new_v4();
        let span = generation_span(
            &generation_id.to_string(),
            &request.story_generation_id.to_string(),
            request.story_index,
        );

        async move {
            self.store.create(GenerationRecord::new(
                generation_id,
                request.story_generation_id,
                request.story_index,
            ));
            let mut run = Run {
                id: generation_id,
                machine: StateMachine::new(),
                store: Arc::clone(&self.store),
                cancel,
            };

            match self.execute(&mut run, &request).await {
                Ok(result) => Ok(result),
                Err(err) => {
                    let terminal = if err.is_cancelled() {
                        GenerationState::Cancelled
                    } else {
                        GenerationState::Failed
                    };
                    run.advance(terminal);
                    self.store.record_error(generation_id, err.to_string());
                    info!(
                        state = terminal.as_str(),
                        component = err.component(),
                        "Generation ended without a result"
                    );
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        run: &mut Run,
        request: &CodeGenerationRequest,
    ) -> Result<CodeGenerationResult, GenerationError> {
        let started_at = Utc::now();
        let generation_id = run.id;
        let story_generation_id = request.story_generation_id;

        let chain = run
            .step(GenerationState::ValidatingDependencies, async {
                self.validator
                    .validate(story_generation_id, Stage::CodeGeneration)
                    .await
                    .into_result()
            })
            .await?;

        let (context, assembled) = run
            .step(GenerationState::AssemblingContext, async {
                let instruction = self.load_instruction().await?;
                let context = self.resolve_context(generation_id, request, &chain, instruction)?;
                let assembled = self
                    .assembler
                    .assemble(story_generation_id, request.story_index)
                    .await?;
                Ok::<_, GenerationError>((context, assembled))
            })
            .await?;

        let tests = run
            .step(
                GenerationState::GeneratingTests,
                self.test_generator.generate(
                    generation_id,
                    &context.instruction,
                    &assembled,
                    &context.selected_model,
                ),
            )
            .await?;

        let implementation = run
            .step(
                GenerationState::GeneratingImplementation,
                self.implementation_generator.generate(
                    generation_id,
                    &context.instruction,
                    &assembled,
                    &tests.artifacts,
                    &context.selected_model,
                ),
            )
            .await?;

        let validation = run
            .step(GenerationState::ValidatingCode, async {
                let all: Vec<CodeArtifact> = tests
                    .artifacts
                    .iter()
                    .chain(&implementation.artifacts)
                    .cloned()
                    .collect();
                Ok::<_, GenerationError>(self.code_validator.validate_all(&all))
            })
            .await?;

        let implementation_count = implementation.artifacts.len();
        let (organized_files, archive) = run
            .step(GenerationState::Organizing, async {
                let organized = self.organizer.organize(
                    implementation
                        .artifacts
                        .iter()
                        .chain(&tests.artifacts)
                        .cloned()
                        .collect(),
                );
                let (implementation_files, test_files) = organized.split_at(implementation_count);
                let archive =
                    self.organizer
                        .package_zip(generation_id, implementation_files, test_files)?;
                Ok::<_, GenerationError>((organized, archive))
            })
            .await?;

        let mut warnings: Vec<GenerationWarning> = Vec::new();
        for warning in tests.warnings.iter().chain(&implementation.warnings) {
            if !warnings.contains(warning) {
                warnings.push(warning.clone());
            }
        }
        for file in validation.iter().filter(|f| !f.is_valid()) {
            warn!(
                file_name = %file.file_name,
                issues = file.issues.len(),
                "Generated file has syntax issues"
            );
            warnings.push(GenerationWarning::SyntaxIssues {
                file_name: file.file_name.clone(),
                issue_count: file.issues.len(),
            });
        }

        run.advance(GenerationState::PendingReview);
        let result = CodeGenerationResult {
            generation_id,
            story_generation_id,
            story_index: request.story_index,
            status: GenerationState::PendingReview,
            syntax_valid: validation.iter().all(|f| f.is_valid()),
            validation,
            generated_files: implementation.artifacts,
            test_files: tests.artifacts,
            organized_files,
            selected_model: context.selected_model,
            provider_used: implementation.provider,
            model_used: implementation.model_used,
            fallback: implementation.fallback.or(tests.fallback),
            warnings,
            estimated_context_tokens: assembled.estimated_tokens,
            package_digest: archive.digest,
            started_at,
            completed_at: Utc::now(),
        };
        self.store.complete(generation_id, result.clone());

        info!(
            tests = result.test_files.len(),
            implementation = result.generated_files.len(),
            syntax_valid = result.syntax_valid,
            warnings = result.warnings.len(),
            "Generation ready for review"
        );
        Ok(result)
    }

    async fn load_instruction(&self) -> Result<String, GenerationError> {
        let unavailable = || GenerationError::InstructionUnavailable {
            service: self.instruction_service.clone(),
        };
        let instruction = self
            .instructions
            .get_instruction(&self.instruction_service)
            .await
            .map_err(|e| {
                warn!(service = %self.instruction_service, error = %e, "Instruction lookup failed");
                unavailable()
            })?;
        if !instruction.is_valid || instruction.content.trim().is_empty() {
            return Err(unavailable());
        }
        Ok(instruction.content)
    }

    fn resolve_context(
        &self,
        generation_id: GenerationId,
        request: &CodeGenerationRequest,
        chain: &DependencyValidationResult,
        instruction: String,
    ) -> Result<CodeGenerationContext, GenerationError> {
        let (Some(planning_id), Some(requirements_analysis_id)) =
            (chain.planning_id, chain.requirements_analysis_id)
        else {
            return Err(GenerationError::ContextAssembly {
                reason: "approval chain did not resolve the upstream plan and requirements"
                    .to_string(),
            });
        };
        Ok(CodeGenerationContext {
            generation_id,
            story_generation_id: request.story_generation_id,
            story_index: request.story_index,
            planning_id,
            requirements_analysis_id,
            selected_model: request
                .selected_model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            instruction,
        })
    }

    /// Current record for `generation_id`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn get_status(&self, generation_id: GenerationId) -> Result<GenerationRecord, GenerationError> {
        self.store
            .get(generation_id)
            .ok_or_else(|| GenerationError::NotFound {
                id: generation_id.to_string(),
            })
    }

    /// Organized artifacts of a completed run; empty while the run has no result.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn get_artifacts(&self, generation_id: GenerationId) -> Result<Vec<CodeArtifact>, GenerationError> {
        Ok(self
            .get_status(generation_id)?
            .result
            .map(|r| r.organized_files)
            .unwrap_or_default())
    }

    /// Re-package a completed run. The bytes match the original package.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `PackagingFailure` if the run produced
    /// no result or zipping fails.
    pub fn package(&self, generation_id: GenerationId) -> Result<PackagedArchive, GenerationError> {
        let record = self.get_status(generation_id)?;
        let Some(result) = record.result else {
            return Err(GenerationError::PackagingFailure {
                reason: format!(
                    "generation {generation_id} has no artifacts (state: {})",
                    record.state
                ),
            });
        };
        let implementation_count = result.generated_files.len();
        let (implementation_files, test_files) =
            result.organized_files.split_at(implementation_count);
        self.organizer
            .package_zip(generation_id, implementation_files, test_files)
    }
}
