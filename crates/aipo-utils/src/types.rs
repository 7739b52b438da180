//! Core identifiers shared across the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a requirements-analysis record.
pub type RequirementsAnalysisId = Uuid;
/// Identifier of a project-planning record.
pub type PlanningId = Uuid;
/// Identifier of a story-generation record (one batch of user stories).
pub type StoryGenerationId = Uuid;
/// Identifier of a single code-generation run.
pub type GenerationId = Uuid;

/// One step in the fixed, linear content pipeline.
///
/// The declaration order is the pipeline order, so the derived `Ord` is the
/// total stage ordering:
/// Requirements Analysis → Project Planning → Story Generation → Prompt Generation → Code Generation.
///
/// # Serialization
///
/// `Stage` serializes to its kebab-case name (e.g., `"story-generation"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Requirements analysis of the raw project description.
    RequirementsAnalysis,
    /// Architecture and roadmap planning built on approved requirements.
    ProjectPlanning,
    /// User stories derived from an approved plan.
    StoryGeneration,
    /// Per-story prompts derived from approved stories.
    PromptGeneration,
    /// Test-first code generation for a story.
    CodeGeneration,
}

impl Stage {
    /// Every stage in pipeline order.
    pub const ALL: [Stage; 5] = [
        Stage::RequirementsAnalysis,
        Stage::ProjectPlanning,
        Stage::StoryGeneration,
        Stage::PromptGeneration,
        Stage::CodeGeneration,
    ];

    /// Canonical kebab-case name used in logs, JSON and CLI arguments.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RequirementsAnalysis => "requirements-analysis",
            Self::ProjectPlanning => "project-planning",
            Self::StoryGeneration => "story-generation",
            Self::PromptGeneration => "prompt-generation",
            Self::CodeGeneration => "code-generation",
        }
    }

    /// Human-readable name for error messages.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::RequirementsAnalysis => "Requirements Analysis",
            Self::ProjectPlanning => "Project Planning",
            Self::StoryGeneration => "Story Generation",
            Self::PromptGeneration => "Prompt Generation",
            Self::CodeGeneration => "Code Generation",
        }
    }

    /// The stage immediately before this one, if any.
    #[must_use]
    pub const fn previous(&self) -> Option<Stage> {
        match self {
            Self::RequirementsAnalysis => None,
            Self::ProjectPlanning => Some(Self::RequirementsAnalysis),
            Self::StoryGeneration => Some(Self::ProjectPlanning),
            Self::PromptGeneration => Some(Self::StoryGeneration),
            Self::CodeGeneration => Some(Self::PromptGeneration),
        }
    }

    /// The stage immediately after this one, if any.
    #[must_use]
    pub const fn next(&self) -> Option<Stage> {
        match self {
            Self::RequirementsAnalysis => Some(Self::ProjectPlanning),
            Self::ProjectPlanning => Some(Self::StoryGeneration),
            Self::StoryGeneration => Some(Self::PromptGeneration),
            Self::PromptGeneration => Some(Self::CodeGeneration),
            Self::CodeGeneration => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "Unknown stage '{s}'. Expected one of: {}",
                    Stage::ALL.map(|stage| stage.as_str()).join(", ")
                )
            })
    }
}

/// Review status of an upstream stage record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalStatus {
    #[default]
    Draft,
    PendingReview,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingReview => "pending-review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two AI-backed steps of a code generation run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationStep {
    Tests,
    Implementation,
}

impl GenerationStep {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tests => "tests",
            Self::Implementation => "implementation",
        }
    }
}

impl fmt::Display for GenerationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tests => write!(f, "Test"),
            Self::Implementation => write!(f, "Implementation"),
        }
    }
}

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Cli,
    ConfigFile(PathBuf),
    Defaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "cli"),
            Self::ConfigFile(path) => write!(f, "config ({})", path.display()),
            Self::Defaults => write!(f, "defaults"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_is_pipeline_order() {
        let mut sorted = Stage::ALL;
        sorted.sort();
        assert_eq!(sorted, Stage::ALL);
        assert!(Stage::RequirementsAnalysis < Stage::CodeGeneration);
    }

    #[test]
    fn test_previous_and_next_are_inverse() {
        for stage in Stage::ALL {
            if let Some(next) = stage.next() {
                assert_eq!(next.previous(), Some(stage));
            }
        }
        assert_eq!(Stage::RequirementsAnalysis.previous(), None);
        assert_eq!(Stage::CodeGeneration.next(), None);
    }

    #[test]
    fn test_stage_from_str_accepts_variants() {
        assert_eq!("code-generation".parse::<Stage>(), Ok(Stage::CodeGeneration));
        assert_eq!("Story_Generation".parse::<Stage>(), Ok(Stage::StoryGeneration));
        assert_eq!(
            "project planning".parse::<Stage>(),
            Ok(Stage::ProjectPlanning)
        );
        assert!("deployment".parse::<Stage>().is_err());
    }

    #[test]
    fn test_stage_serializes_kebab_case() {
        let json = serde_json::to_string(&Stage::PromptGeneration).unwrap();
        assert_eq!(json, "\"prompt-generation\"");
    }

    #[test]
    fn test_only_approved_is_approved() {
        assert!(ApprovalStatus::Approved.is_approved());
        assert!(!ApprovalStatus::PendingReview.is_approved());
        assert!(!ApprovalStatus::Rejected.is_approved());
        assert!(!ApprovalStatus::default().is_approved());
    }
}
