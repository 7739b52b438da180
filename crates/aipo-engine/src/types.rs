//! Value types flowing through a code generation run.

use aipo_llm::LlmFallbackInfo;
use aipo_utils::types::{GenerationId, GenerationStep, PlanningId, RequirementsAnalysisId, StoryGenerationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::code_validator::FileValidation;
use crate::state::GenerationState;

/// One approved user story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStory {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_points: Option<u32>,
}

impl UserStory {
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            acceptance_criteria: Vec::new(),
            priority: None,
            story_points: None,
        }
    }

    #[must_use]
    pub fn with_criteria<I, S>(mut self, criteria: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.acceptance_criteria = criteria.into_iter().map(Into::into).collect();
        self
    }
}

/// Kind of generated file. Drives where the organizer places it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactType {
    Test,
    Implementation,
    Service,
    Controller,
    Interface,
    Model,
}

impl ArtifactType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Implementation => "implementation",
            Self::Service => "service",
            Self::Controller => "controller",
            Self::Interface => "interface",
            Self::Model => "model",
        }
    }

    /// Infer the kind from a file name such as `UserServiceTests.cs`.
    #[must_use]
    pub fn infer(file_name: &str) -> Self {
        let stem = file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(file_name)
            .split('.')
            .next()
            .unwrap_or_default();
        let lower = file_name.to_ascii_lowercase();

        if stem.ends_with("Test")
            || stem.ends_with("Tests")
            || stem.starts_with("test_")
            || lower.contains(".test.")
            || lower.contains(".spec.")
        {
            Self::Test
        } else if stem.ends_with("Service") {
            Self::Service
        } else if stem.ends_with("Controller") {
            Self::Controller
        } else if is_interface_name(stem) {
            Self::Interface
        } else if ["Dto", "Model", "Entity"].iter().any(|s| stem.ends_with(s)) {
            Self::Model
        } else {
            Self::Implementation
        }
    }
}

fn is_interface_name(stem: &str) -> bool {
    let mut chars = stem.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('I'), Some(second)) if second.is_ascii_uppercase()
    )
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generated file.
///
/// `relative_path` stays `None` until the file organizer places the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeArtifact {
    pub file_name: String,
    pub content: String,
    pub file_type: ArtifactType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,
}

impl CodeArtifact {
    #[must_use]
    pub fn new(file_name: impl Into<String>, content: impl Into<String>, file_type: ArtifactType) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
            file_type,
            relative_path: None,
        }
    }

    /// Placed path if organized, otherwise the bare file name.
    #[must_use]
    pub fn path(&self) -> &str {
        self.relative_path.as_deref().unwrap_or(&self.file_name)
    }
}

/// Token-bounded input for both generation steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComprehensiveContext {
    pub story_generation_id: StoryGenerationId,
    pub planning_id: PlanningId,
    pub story_index: usize,
    pub target_story: UserStory,
    /// Every other story of the same generation, in original order.
    pub related_stories: Vec<UserStory>,
    pub technical_context: String,
    pub business_context: String,
    pub estimated_tokens: usize,
}

/// Non-fatal conditions surfaced in the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GenerationWarning {
    /// The response had no fenced code blocks; the whole text became one artifact.
    MalformedResponse { step: GenerationStep, file_name: String },
    /// A different provider was substituted for the requested one.
    ProviderFallback { info: LlmFallbackInfo },
    /// Generated code failed the lightweight syntax checks.
    SyntaxIssues { file_name: String, issue_count: usize },
}

impl fmt::Display for GenerationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedResponse { step, file_name } => write!(
                f,
                "{step} response contained no code blocks; kept as {file_name}"
            ),
            Self::ProviderFallback { info } => f.write_str(&info.warning_message()),
            Self::SyntaxIssues {
                file_name,
                issue_count,
            } => write!(f, "{file_name}: {issue_count} syntax issue(s)"),
        }
    }
}

/// What the caller asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeGenerationRequest {
    pub story_generation_id: StoryGenerationId,
    pub story_index: usize,
    /// `provider` or `provider:model`. `None` uses the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_model: Option<String>,
}

impl CodeGenerationRequest {
    #[must_use]
    pub fn new(story_generation_id: StoryGenerationId, story_index: usize) -> Self {
        Self {
            story_generation_id,
            story_index,
            selected_model: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, selected_model: impl Into<String>) -> Self {
        self.selected_model = Some(selected_model.into());
        self
    }
}

/// Everything resolved before the first AI call.
#[derive(Debug, Clone)]
pub struct CodeGenerationContext {
    pub generation_id: GenerationId,
    pub story_generation_id: StoryGenerationId,
    pub story_index: usize,
    pub planning_id: PlanningId,
    pub requirements_analysis_id: RequirementsAnalysisId,
    pub selected_model: String,
    pub instruction: String,
}

/// Output envelope of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeGenerationResult {
    pub generation_id: GenerationId,
    pub story_generation_id: StoryGenerationId,
    pub story_index: usize,
    pub status: GenerationState,
    /// Implementation-step artifacts.
    pub generated_files: Vec<CodeArtifact>,
    /// Test-step artifacts.
    pub test_files: Vec<CodeArtifact>,
    /// Both sets with `relative_path` assigned.
    pub organized_files: Vec<CodeArtifact>,
    pub validation: Vec<FileValidation>,
    pub syntax_valid: bool,
    pub selected_model: String,
    pub provider_used: String,
    pub model_used: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<LlmFallbackInfo>,
    #[serde(default)]
    pub warnings: Vec<GenerationWarning>,
    pub estimated_context_tokens: usize,
    /// BLAKE3 of the packaged zip.
    pub package_digest: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}
