//! Approval-chain validation
//!
//! Walks the pipeline backward from the requested stage and stops at the
//! first upstream stage that is missing or not approved. The walk only reads
//! from the [`PipelineStore`], so it is safe to call repeatedly and from
//! concurrent tasks.

use aipo_utils::error::GenerationError;
use aipo_utils::types::{
    ApprovalStatus, PlanningId, RequirementsAnalysisId, Stage, StoryGenerationId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ports::PipelineStore;

/// Outcome of one validation call.
///
/// Upstream ids discovered during the walk are carried on success so the
/// caller does not resolve them again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyValidationResult {
    pub is_valid: bool,
    pub stage: Stage,
    pub entity_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// The first upstream stage found broken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broken_stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_generation_id: Option<StoryGenerationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planning_id: Option<PlanningId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements_analysis_id: Option<RequirementsAnalysisId>,
}

impl DependencyValidationResult {
    fn new(stage: Stage, entity_id: Uuid) -> Self {
        Self {
            is_valid: true,
            stage,
            entity_id,
            error_message: None,
            broken_stage: None,
            story_generation_id: None,
            planning_id: None,
            requirements_analysis_id: None,
        }
    }

    fn broken(mut self, broken_stage: Stage, message: String) -> Self {
        self.is_valid = false;
        self.broken_stage = Some(broken_stage);
        self.error_message = Some(message);
        self
    }

    /// Convert a failed result into `GenerationError::ValidationFailure`.
    ///
    /// # Errors
    ///
    /// Returns the failure when `is_valid` is false.
    pub fn into_result(self) -> Result<Self, GenerationError> {
        if self.is_valid {
            return Ok(self);
        }
        Err(GenerationError::ValidationFailure {
            stage: self.stage,
            broken_stage: self.broken_stage.unwrap_or(self.stage),
            message: self
                .error_message
                .unwrap_or_else(|| "dependency chain is broken".to_string()),
        })
    }
}

/// Checks that every stage upstream of a target stage is approved.
#[derive(Clone)]
pub struct DependencyValidator {
    store: Arc<dyn PipelineStore>,
}

impl DependencyValidator {
    pub fn new(store: Arc<dyn PipelineStore>) -> Self {
        Self { store }
    }

    /// Validate the chain required before `stage` may run for `entity_id`.
    ///
    /// The entity is the record produced by the stage immediately upstream:
    ///
    /// | Stage | Entity |
    /// |-------|--------|
    /// | `ProjectPlanning` | requirements analysis |
    /// | `StoryGeneration` | project plan |
    /// | `PromptGeneration`, `CodeGeneration` | story generation |
    ///
    /// `RequirementsAnalysis` has no upstream and is always valid.
    pub async fn validate(&self, entity_id: Uuid, stage: Stage) -> DependencyValidationResult {
        let result = DependencyValidationResult::new(stage, entity_id);
        let result = match stage {
            Stage::RequirementsAnalysis => result,
            Stage::ProjectPlanning => self.check_requirements(result, entity_id).await,
            Stage::StoryGeneration => self.check_planning(result, entity_id).await,
            Stage::PromptGeneration | Stage::CodeGeneration => {
                self.check_stories(result, entity_id).await
            }
        };

        if result.is_valid {
            debug!(stage = stage.as_str(), entity_id = %entity_id, "Dependency chain valid");
        } else {
            warn!(
                stage = stage.as_str(),
                entity_id = %entity_id,
                broken_stage = ?result.broken_stage.map(|s| s.as_str()),
                error = result.error_message.as_deref().unwrap_or_default(),
                "Dependency chain broken"
            );
        }
        result
    }

    async fn check_stories(
        &self,
        mut result: DependencyValidationResult,
        story_generation_id: StoryGenerationId,
    ) -> DependencyValidationResult {
        let broken = Stage::StoryGeneration;
        result.story_generation_id = Some(story_generation_id);

        match self.store.get_approved_stories(story_generation_id).await {
            Err(e) => {
                return result.broken(
                    broken,
                    format!("Failed to load stories for story generation {story_generation_id}: {e}"),
                );
            }
            Ok(None) => {
                return result.broken(
                    broken,
                    format!("Story generation {story_generation_id} was not found or is not approved"),
                );
            }
            Ok(Some(stories)) if stories.is_empty() => {
                return result.broken(
                    broken,
                    format!("Story generation {story_generation_id} has no approved stories"),
                );
            }
            Ok(Some(_)) => {}
        }

        let planning_id = match self.store.get_planning_id(story_generation_id).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                return result.broken(
                    Stage::ProjectPlanning,
                    format!("No project plan is linked to story generation {story_generation_id}"),
                );
            }
            Err(e) => {
                return result.broken(
                    Stage::ProjectPlanning,
                    format!("Failed to resolve the project plan for story generation {story_generation_id}: {e}"),
                );
            }
        };
        self.check_planning(result, planning_id).await
    }

    async fn check_planning(
        &self,
        mut result: DependencyValidationResult,
        planning_id: PlanningId,
    ) -> DependencyValidationResult {
        let broken = Stage::ProjectPlanning;
        result.planning_id = Some(planning_id);

        match self.store.get_planning_status(planning_id).await {
            Ok(Some(status)) if status.is_approved() => {}
            Ok(Some(status)) => {
                return result.broken(
                    broken,
                    format!("Project plan {planning_id} is {status}, not approved"),
                );
            }
            Ok(None) => {
                return result.broken(broken, format!("Project plan {planning_id} was not found"));
            }
            Err(e) => {
                return result.broken(
                    broken,
                    format!("Failed to load project plan {planning_id}: {e}"),
                );
            }
        }

        let requirements_id = match self.store.get_requirements_analysis_id(planning_id).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                return result.broken(
                    Stage::RequirementsAnalysis,
                    format!("No requirements analysis is linked to project plan {planning_id}"),
                );
            }
            Err(e) => {
                return result.broken(
                    Stage::RequirementsAnalysis,
                    format!("Failed to resolve the requirements analysis for project plan {planning_id}: {e}"),
                );
            }
        };
        self.check_requirements(result, requirements_id).await
    }

    async fn check_requirements(
        &self,
        mut result: DependencyValidationResult,
        requirements_id: RequirementsAnalysisId,
    ) -> DependencyValidationResult {
        let broken = Stage::RequirementsAnalysis;
        result.requirements_analysis_id = Some(requirements_id);

        match self.store.get_requirements_status(requirements_id).await {
            Ok(Some(ApprovalStatus::Approved)) => result,
            Ok(Some(status)) => result.broken(
                broken,
                format!("Requirements analysis {requirements_id} is {status}, not approved"),
            ),
            Ok(None) => result.broken(
                broken,
                format!("Requirements analysis {requirements_id} was not found"),
            ),
            Err(e) => result.broken(
                broken,
                format!("Failed to load requirements analysis {requirements_id}: {e}"),
            ),
        }
    }
}
