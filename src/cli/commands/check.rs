//! Check command implementation
//!
//! Handles `aipo check`: walks the approval chain and reports whether
//! generation may start.

use aipo_engine::DependencyValidator;
use aipo_utils::types::Stage;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use super::json_emit::emit_check_json;
use crate::workspace::Workspace;

/// Execute the check command.
///
/// A broken chain is printed and then returned as
/// `GenerationError::ValidationFailure`, so the process exits non-zero.
pub async fn execute_check_command(
    workspace_path: &Path,
    entity: Uuid,
    stage: Stage,
    json: bool,
) -> Result<()> {
    let workspace = Arc::new(Workspace::load(workspace_path)?);
    let validator = DependencyValidator::new(workspace);
    let result = validator.validate(entity, stage).await;

    if json {
        println!("{}", emit_check_json(&result)?);
    } else {
        println!("Dependency check for {} ({entity})", stage.as_str());
        if result.is_valid {
            println!("  ✓ All upstream stages approved");
            if let Some(id) = result.planning_id {
                println!("  Planning: {id}");
            }
            if let Some(id) = result.requirements_analysis_id {
                println!("  Requirements analysis: {id}");
            }
        } else if let Some(broken) = result.broken_stage {
            println!("  ✗ Blocked at {}", broken.as_str());
        }
    }

    result.into_result()?;
    Ok(())
}
