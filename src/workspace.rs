//! JSON workspace file and file-backed review queue
//!
//! The workspace file stands in for the systems that own requirements,
//! plans, stories and instruction templates:
//!
//! ```json
//! {
//!   "requirements": [{ "id": "…", "status": "approved", "business_context": "…" }],
//!   "plans": [{ "id": "…", "requirements_analysis_id": "…", "status": "approved",
//!               "technical_context": "…" }],
//!   "story_generations": [{ "id": "…", "planning_id": "…", "status": "approved",
//!                           "stories": [{ "title": "…", "acceptance_criteria": ["…"] }] }],
//!   "instructions": { "CodeGenerator": "…" }
//! }
//! ```

use aipo_engine::{
    Instruction, InstructionSource, PipelineStore, ReviewSubmission, ReviewSubmitter, UserStory,
};
use aipo_utils::canonicalization::emit_jcs;
use aipo_utils::error::AipoError;
use aipo_utils::types::{
    ApprovalStatus, PlanningId, RequirementsAnalysisId, Stage, StoryGenerationId,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementsRecord {
    pub id: RequirementsAnalysisId,
    pub status: ApprovalStatus,
    #[serde(default)]
    pub business_context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRecord {
    pub id: PlanningId,
    pub requirements_analysis_id: RequirementsAnalysisId,
    pub status: ApprovalStatus,
    #[serde(default)]
    pub technical_context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryGenerationRecord {
    pub id: StoryGenerationId,
    pub planning_id: PlanningId,
    pub status: ApprovalStatus,
    #[serde(default)]
    pub stories: Vec<UserStory>,
}

/// Upstream pipeline records loaded from one JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default)]
    pub requirements: Vec<RequirementsRecord>,
    #[serde(default)]
    pub plans: Vec<PlanRecord>,
    #[serde(default)]
    pub story_generations: Vec<StoryGenerationRecord>,
    /// Instruction templates keyed by service name.
    #[serde(default)]
    pub instructions: HashMap<String, String>,
}

impl Workspace {
    /// Load and parse a workspace file.
    ///
    /// # Errors
    ///
    /// `AipoError::Workspace` if the file cannot be read or is not valid JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AipoError> {
        let path = path.as_ref();
        let workspace_error = |reason: String| AipoError::Workspace {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| workspace_error(e.to_string()))?;
        let workspace: Self =
            serde_json::from_str(&raw).map_err(|e| workspace_error(e.to_string()))?;
        debug!(
            path = %path.display(),
            requirements = workspace.requirements.len(),
            plans = workspace.plans.len(),
            story_generations = workspace.story_generations.len(),
            "Workspace loaded"
        );
        Ok(workspace)
    }

    fn story_generation(&self, id: StoryGenerationId) -> Option<&StoryGenerationRecord> {
        self.story_generations.iter().find(|r| r.id == id)
    }

    fn plan(&self, id: PlanningId) -> Option<&PlanRecord> {
        self.plans.iter().find(|r| r.id == id)
    }

    fn requirements_record(&self, id: RequirementsAnalysisId) -> Option<&RequirementsRecord> {
        self.requirements.iter().find(|r| r.id == id)
    }
}

#[async_trait]
impl PipelineStore for Workspace {
    async fn get_approved_stories(&self, id: StoryGenerationId) -> Result<Option<Vec<UserStory>>> {
        Ok(self
            .story_generation(id)
            .filter(|r| r.status.is_approved())
            .map(|r| r.stories.clone()))
    }

    async fn get_planning_id(&self, id: StoryGenerationId) -> Result<Option<PlanningId>> {
        Ok(self.story_generation(id).map(|r| r.planning_id))
    }

    async fn get_planning_status(&self, id: PlanningId) -> Result<Option<ApprovalStatus>> {
        Ok(self.plan(id).map(|r| r.status))
    }

    async fn get_requirements_analysis_id(&self, id: PlanningId) -> Result<Option<RequirementsAnalysisId>> {
        Ok(self.plan(id).map(|r| r.requirements_analysis_id))
    }

    async fn get_requirements_status(&self, id: RequirementsAnalysisId) -> Result<Option<ApprovalStatus>> {
        Ok(self.requirements_record(id).map(|r| r.status))
    }

    async fn get_technical_context(&self, id: PlanningId) -> Result<Option<String>> {
        Ok(self.plan(id).map(|r| r.technical_context.clone()))
    }

    async fn get_business_context(&self, id: RequirementsAnalysisId) -> Result<Option<String>> {
        Ok(self.requirements_record(id).map(|r| r.business_context.clone()))
    }
}

#[async_trait]
impl InstructionSource for Workspace {
    async fn get_instruction(&self, service_name: &str) -> Result<Instruction> {
        let content = self
            .instructions
            .get(service_name)
            .cloned()
            .with_context(|| format!("workspace has no instruction named '{service_name}'"))?;
        Ok(Instruction {
            is_valid: !content.trim().is_empty(),
            content,
        })
    }
}

#[derive(Serialize)]
struct ReviewEntry<'a> {
    review_id: &'a str,
    service_name: &'a str,
    stage: Stage,
    status: ApprovalStatus,
    submitted_at: DateTime<Utc>,
    content: &'a str,
}

/// Review queue that writes one canonical JSON file per submission.
#[derive(Debug, Clone)]
pub struct FileReviewQueue {
    dir: PathBuf,
}

impl FileReviewQueue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ReviewSubmitter for FileReviewQueue {
    async fn submit_for_review(
        &self,
        content: &str,
        service_name: &str,
        stage: Stage,
    ) -> Result<ReviewSubmission> {
        let review_id = Uuid::new_v4().to_string();
        let entry = ReviewEntry {
            review_id: &review_id,
            service_name,
            stage,
            status: ApprovalStatus::PendingReview,
            submitted_at: Utc::now(),
            content,
        };
        let json = emit_jcs(&entry).context("Failed to serialize review entry")?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create review queue {}", self.dir.display()))?;
        let path = self.dir.join(format!("{review_id}.json"));
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!(review_id = %review_id, stage = stage.as_str(), "Submitted for review");
        Ok(ReviewSubmission {
            review_id,
            status: ApprovalStatus::PendingReview,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aipo_engine::{DependencyValidator, GenerationState};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn chain(story_status: ApprovalStatus, plan_status: ApprovalStatus) -> (Workspace, StoryGenerationId) {
        let requirements_id = Uuid::new_v4();
        let planning_id = Uuid::new_v4();
        let story_generation_id = Uuid::new_v4();
        let workspace = Workspace {
            requirements: vec![RequirementsRecord {
                id: requirements_id,
                status: ApprovalStatus::Approved,
                business_context: "Grow repeat purchases.".to_string(),
            }],
            plans: vec![PlanRecord {
                id: planning_id,
                requirements_analysis_id: requirements_id,
                status: plan_status,
                technical_context: "ASP.NET Core minimal APIs.".to_string(),
            }],
            story_generations: vec![StoryGenerationRecord {
                id: story_generation_id,
                planning_id,
                status: story_status,
                stories: vec![UserStory::new("Checkout", "As a shopper I want to pay")],
            }],
            instructions: HashMap::from([("CodeGenerator".to_string(), "Write C#.".to_string())]),
        };
        (workspace, story_generation_id)
    }

    #[test]
    fn test_load_parses_minimal_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("workspace.json");
        std::fs::write(
            &path,
            r#"{"story_generations":[{"id":"6f1c1d1e-8a51-4c3e-9a53-0c2b6f7d9a10","planning_id":"0b0e4e0c-5b8e-4a53-8e7a-46f1c3a3f8c1","status":"approved","stories":[{"title":"Login","acceptance_criteria":["Rejects bad passwords"]}]}]}"#,
        )
        .unwrap();

        let workspace = Workspace::load(&path).unwrap();
        assert_eq!(workspace.story_generations.len(), 1);
        assert_eq!(workspace.story_generations[0].stories[0].title, "Login");
        assert!(workspace.instructions.is_empty());
    }

    #[test]
    fn test_load_reports_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("workspace.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = Workspace::load(&path).unwrap_err();
        assert!(matches!(err, AipoError::Workspace { .. }));
    }

    #[tokio::test]
    async fn test_unapproved_stories_are_hidden() {
        let (workspace, id) = chain(ApprovalStatus::PendingReview, ApprovalStatus::Approved);
        assert!(workspace.get_approved_stories(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_validator_reads_workspace_chain() {
        let (workspace, id) = chain(ApprovalStatus::Approved, ApprovalStatus::Rejected);
        let validator = DependencyValidator::new(Arc::new(workspace));
        let result = validator.validate(id, Stage::CodeGeneration).await;
        assert!(!result.is_valid);
        assert_eq!(result.broken_stage, Some(Stage::ProjectPlanning));
    }

    #[tokio::test]
    async fn test_instruction_lookup() {
        let (workspace, _) = chain(ApprovalStatus::Approved, ApprovalStatus::Approved);
        let instruction = workspace.get_instruction("CodeGenerator").await.unwrap();
        assert!(instruction.is_valid);
        assert!(workspace.get_instruction("Missing").await.is_err());
    }

    #[tokio::test]
    async fn test_review_queue_writes_pending_entry() {
        let dir = TempDir::new().unwrap();
        let queue = FileReviewQueue::new(dir.path().join("reviews"));

        let submission = queue
            .submit_for_review("{\"status\":\"pending-review\"}", "CodeGenerator", Stage::CodeGeneration)
            .await
            .unwrap();
        assert_eq!(submission.status, ApprovalStatus::PendingReview);

        let written = std::fs::read_to_string(
            queue.dir().join(format!("{}.json", submission.review_id)),
        )
        .unwrap();
        let entry: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(entry["stage"], "code-generation");
        assert_eq!(entry["status"], GenerationState::PendingReview.as_str());
    }
}
