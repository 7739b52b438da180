//! Narrow interfaces to the collaborators that own persistence.
//!
//! Stories, plans, requirements, instruction templates and the review queue
//! live outside the engine. Lookups return `Ok(None)` for a missing record and
//! reserve `Err` for the lookup itself failing.

use aipo_utils::types::{
    ApprovalStatus, PlanningId, RequirementsAnalysisId, Stage, StoryGenerationId,
};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::UserStory;

#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Stories of an approved story generation. `None` if the generation is
    /// unknown or not approved.
    async fn get_approved_stories(&self, id: StoryGenerationId) -> Result<Option<Vec<UserStory>>>;

    async fn get_planning_id(&self, id: StoryGenerationId) -> Result<Option<PlanningId>>;

    async fn get_planning_status(&self, id: PlanningId) -> Result<Option<ApprovalStatus>>;

    async fn get_requirements_analysis_id(&self, id: PlanningId) -> Result<Option<RequirementsAnalysisId>>;

    async fn get_requirements_status(&self, id: RequirementsAnalysisId) -> Result<Option<ApprovalStatus>>;

    /// Architecture and technology notes recorded with the plan.
    async fn get_technical_context(&self, id: PlanningId) -> Result<Option<String>>;

    /// Business goals recorded with the requirements analysis.
    async fn get_business_context(&self, id: RequirementsAnalysisId) -> Result<Option<String>>;
}

/// A named prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub content: String,
    pub is_valid: bool,
}

#[async_trait]
pub trait InstructionSource: Send + Sync {
    async fn get_instruction(&self, service_name: &str) -> Result<Instruction>;
}

/// Acknowledgement from the review queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSubmission {
    pub review_id: String,
    pub status: ApprovalStatus,
}

/// Hands a finished result to human review. Called by the layer above the
/// orchestrator.
#[async_trait]
pub trait ReviewSubmitter: Send + Sync {
    async fn submit_for_review(
        &self,
        content: &str,
        service_name: &str,
        stage: Stage,
    ) -> Result<ReviewSubmission>;
}
