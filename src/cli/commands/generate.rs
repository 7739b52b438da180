//! Generate command implementation
//!
//! Handles `aipo generate`: runs one generation, writes the zip,
//! `result.json` and the organized files under `--out`, then queues the
//! result for review. Ctrl-C cancels at any point until the command returns.

use aipo_config::Config;
use aipo_engine::{
    CodeGenerationRequest, CodeGenerationResult, GenerationOrchestrator, InMemoryGenerationStore,
    PackagedArchive, ReviewSubmitter,
};
use aipo_llm::ProviderRegistry;
use aipo_utils::error::GenerationError;
use aipo_utils::types::Stage;
use anyhow::{Context, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::json_emit::emit_result_json;
use crate::workspace::{FileReviewQueue, Workspace};

/// State reported when an interrupt arrives after generation finished.
const DELIVERY_STATE: &str = "writing-output";

pub async fn execute_generate_command(
    workspace_path: &Path,
    story_generation: Uuid,
    story_index: usize,
    out: &Path,
    submit_review: bool,
    config: &Config,
) -> Result<()> {
    let workspace = Arc::new(Workspace::load(workspace_path)?);
    let registry = Arc::new(ProviderRegistry::from_config(config)?);
    let orchestrator = GenerationOrchestrator::new(
        config,
        registry,
        workspace.clone(),
        workspace,
        Arc::new(InMemoryGenerationStore::new()),
    );

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling");
                cancel.cancel();
            }
        }
    });

    let request = CodeGenerationRequest::new(story_generation, story_index);
    let outcome = generate_and_deliver(&orchestrator, request, out, submit_review, config, &cancel).await;
    interrupt.abort();
    outcome
}

async fn generate_and_deliver(
    orchestrator: &GenerationOrchestrator,
    request: CodeGenerationRequest,
    out: &Path,
    submit_review: bool,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<()> {
    let result = orchestrator.generate(request, cancel.clone()).await?;
    let archive = orchestrator.package(result.generation_id)?;
    let result_json = emit_result_json(&result)?;

    let zip_path = until_cancelled(cancel, write_outputs(out, &result, &result_json, &archive)).await?;

    print_summary(&result);
    println!("  Package: {} (blake3 {})", zip_path.display(), archive.digest);

    if submit_review {
        let queue = FileReviewQueue::new(out.join("reviews"));
        let submission = until_cancelled(cancel, async {
            queue
                .submit_for_review(
                    &result_json,
                    config.generation.instruction_service(),
                    Stage::CodeGeneration,
                )
                .await
                .context("Failed to submit the result for review")
        })
        .await?;
        println!(
            "  Review: {} ({})",
            submission.review_id,
            submission.status.as_str()
        );
    }

    Ok(())
}

/// Run `work` unless `cancel` fires first, which is reported as
/// `GenerationError::Cancelled`.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(GenerationError::Cancelled {
            state: DELIVERY_STATE.to_string(),
        }
        .into()),
        result = work => result,
    }
}

/// Write the zip and `result.json` first, then the organized files.
/// Returns the zip path.
async fn write_outputs(
    out: &Path,
    result: &CodeGenerationResult,
    result_json: &str,
    archive: &PackagedArchive,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("Failed to create {}", out.display()))?;

    let zip_path = out.join(format!("{}.zip", result.generation_id));
    tokio::fs::write(&zip_path, &archive.bytes)
        .await
        .with_context(|| format!("Failed to write {}", zip_path.display()))?;

    let result_path = out.join("result.json");
    tokio::fs::write(&result_path, result_json)
        .await
        .with_context(|| format!("Failed to write {}", result_path.display()))?;

    for artifact in &result.organized_files {
        let path = out.join(artifact.path());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, &artifact.content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    info!(
        out = %out.display(),
        files = result.organized_files.len(),
        "Generated files written"
    );
    Ok(zip_path)
}

fn print_summary(result: &CodeGenerationResult) {
    println!("Generation {}: {}", result.generation_id, result.status);
    println!(
        "  Tests: {} file(s)  Implementation: {} file(s)",
        result.test_files.len(),
        result.generated_files.len()
    );
    println!("  Provider: {} ({})", result.provider_used, result.model_used);
    println!(
        "  Syntax: {}",
        if result.syntax_valid { "ok" } else { "issues found" }
    );
    for artifact in &result.organized_files {
        println!("    {}", artifact.path());
    }
    if !result.warnings.is_empty() {
        println!("  Warnings:");
        for warning in &result.warnings {
            println!("    ⚠ {warning}");
        }
    }
}
