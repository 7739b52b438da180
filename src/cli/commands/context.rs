//! Context command implementation
//!
//! Handles `aipo context`: shows exactly what the generators would send.

use aipo_config::Config;
use aipo_engine::context::render_context;
use aipo_engine::{ContextAssembler, ContextLimits};
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use super::json_emit::emit_context_json;
use crate::workspace::Workspace;

pub async fn execute_context_command(
    workspace_path: &Path,
    story_generation: Uuid,
    story_index: usize,
    json: bool,
    config: &Config,
) -> Result<()> {
    let workspace = Arc::new(Workspace::load(workspace_path)?);
    let assembler = ContextAssembler::new(workspace, ContextLimits::from(&config.context));
    let context = assembler.assemble(story_generation, story_index).await?;

    if json {
        println!("{}", emit_context_json(&context)?);
        return Ok(());
    }

    println!("{}", render_context(&context));
    println!();
    println!(
        "Related stories: {}  Estimated tokens: {}",
        context.related_stories.len(),
        context.estimated_tokens
    );
    Ok(())
}
