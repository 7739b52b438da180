//! End-to-end generation through the public API
//!
//! Drives a workspace file through `GenerationOrchestrator` with scripted
//! providers, then hands the result to the file review queue. Uses only
//! `aipo::{...}` paths plus the engine `test-utils` helpers.

use std::collections::HashMap;
use std::sync::Arc;

use aipo::config::Config;
use aipo::engine::GenerationWarning;
use aipo::llm::LlmBackend;
use aipo_engine::test_support::ScriptedBackend;
use aipo::workspace::{PlanRecord, RequirementsRecord, StoryGenerationRecord};
use aipo::{
    ApprovalStatus, CodeGenerationRequest, FileReviewQueue, GenerationError, GenerationOrchestrator,
    GenerationState, InMemoryGenerationStore, ProviderRegistry, ReviewSubmitter, Stage, UserStory,
    Workspace, emit_jcs,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const TESTS_RESPONSE: &str = "Here are the tests.\n\n```csharp:InvoiceTests.cs\npublic class InvoiceTests\n{\n    public void TotalsLines() { }\n}\n```\n";
const IMPLEMENTATION_RESPONSE: &str = "```csharp:InvoiceService.cs\npublic class InvoiceService\n{\n    public decimal Total() { return 0m; }\n}\n```\n\n```csharp:IInvoiceService.cs\npublic interface IInvoiceService\n{\n    decimal Total();\n}\n```\n";

fn workspace(story_status: ApprovalStatus) -> (Workspace, Uuid) {
    let requirements_id = Uuid::new_v4();
    let planning_id = Uuid::new_v4();
    let story_generation_id = Uuid::new_v4();
    let workspace = Workspace {
        requirements: vec![RequirementsRecord {
            id: requirements_id,
            status: ApprovalStatus::Approved,
            business_context: "Finance needs invoices totalled automatically.".to_string(),
        }],
        plans: vec![PlanRecord {
            id: planning_id,
            requirements_analysis_id: requirements_id,
            status: ApprovalStatus::Approved,
            technical_context: "ASP.NET Core service layer with xUnit.".to_string(),
        }],
        story_generations: vec![StoryGenerationRecord {
            id: story_generation_id,
            planning_id,
            status: story_status,
            stories: vec![
                UserStory::new("Create invoice", "As a clerk I want to create invoices"),
                UserStory::new("Total invoice", "As a clerk I want invoice totals")
                    .with_criteria(["Sums line amounts", "Rejects negative quantities"]),
            ],
        }],
        instructions: HashMap::from([(
            "CodeGenerator".to_string(),
            "Write idiomatic C# for .NET 9.".to_string(),
        )]),
    };
    (workspace, story_generation_id)
}

fn orchestrator(workspace: Workspace, backend: Arc<ScriptedBackend>) -> GenerationOrchestrator {
    let workspace = Arc::new(workspace);
    let registry = Arc::new(ProviderRegistry::new(
        vec![backend as Arc<dyn LlmBackend>],
        vec!["nanogpt".to_string(), "openrouter".to_string()],
    ));
    GenerationOrchestrator::new(
        &Config::minimal_for_testing(),
        registry,
        workspace.clone(),
        workspace,
        Arc::new(InMemoryGenerationStore::new()),
    )
}

#[tokio::test]
async fn test_workspace_story_is_generated_and_queued_for_review() {
    let (workspace, story_generation_id) = workspace(ApprovalStatus::Approved);
    let backend = Arc::new(
        ScriptedBackend::new("nanogpt")
            .respond(TESTS_RESPONSE)
            .respond(IMPLEMENTATION_RESPONSE),
    );
    let orchestrator = orchestrator(workspace, Arc::clone(&backend));

    let result = orchestrator
        .generate(
            CodeGenerationRequest::new(story_generation_id, 1),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.status, GenerationState::PendingReview);
    assert_eq!(result.test_files.len(), 1);
    assert_eq!(result.generated_files.len(), 2);
    assert!(result.syntax_valid);
    assert!(result.warnings.is_empty());

    let paths: Vec<&str> = result.organized_files.iter().map(|a| a.path()).collect();
    assert!(paths.contains(&"Services/InvoiceService.cs"));
    assert!(paths.contains(&"Interfaces/IInvoiceService.cs"));
    assert!(paths.contains(&"Tests/InvoiceTests.cs"));

    // Tests are generated first and the implementation prompt sees them.
    let calls = backend.invocations();
    assert_eq!(calls.len(), 2);
    let implementation_prompt: String = calls[1]
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert!(implementation_prompt.contains("InvoiceTests"));
    assert!(implementation_prompt.contains("Rejects negative quantities"));

    let archive = orchestrator.package(result.generation_id).unwrap();
    assert_eq!(archive.digest, result.package_digest);
    assert_eq!(archive.entries.len(), 4);
    assert!(archive.entries.iter().any(|e| e.ends_with("/manifest.json")));

    let dir = TempDir::new().unwrap();
    let queue = FileReviewQueue::new(dir.path());
    let submission = queue
        .submit_for_review(&emit_jcs(&result).unwrap(), "CodeGenerator", Stage::CodeGeneration)
        .await
        .unwrap();
    assert_eq!(submission.status, ApprovalStatus::PendingReview);
    assert!(dir.path().join(format!("{}.json", submission.review_id)).exists());
}

#[tokio::test]
async fn test_unapproved_stories_block_generation_before_any_ai_call() {
    let (workspace, story_generation_id) = workspace(ApprovalStatus::PendingReview);
    let backend = Arc::new(ScriptedBackend::new("nanogpt").respond(TESTS_RESPONSE));
    let orchestrator = orchestrator(workspace, Arc::clone(&backend));

    assert!(!orchestrator.can_generate(story_generation_id).await);
    let err = orchestrator
        .generate(
            CodeGenerationRequest::new(story_generation_id, 0),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GenerationError::ValidationFailure {
            broken_stage: Stage::StoryGeneration,
            ..
        }
    ));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_unregistered_provider_falls_back_with_warning() {
    let (workspace, story_generation_id) = workspace(ApprovalStatus::Approved);
    let backend = Arc::new(
        ScriptedBackend::new("openrouter")
            .respond(TESTS_RESPONSE)
            .respond(IMPLEMENTATION_RESPONSE),
    );
    let orchestrator = orchestrator(workspace, Arc::clone(&backend));

    let result = orchestrator
        .generate(
            CodeGenerationRequest::new(story_generation_id, 0).with_model("anthropic:claude-sonnet-4"),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.provider_used, "openrouter");
    let fallback = result.fallback.as_ref().unwrap();
    assert_eq!(fallback.requested_provider, "anthropic");
    assert!(
        result
            .warnings
            .iter()
            .any(|w| matches!(w, GenerationWarning::ProviderFallback { .. }))
    );
}
