//! JSON emit functions for CLI output
//!
//! Every `--json` output goes through JCS (RFC 8785) so it is byte-stable.

use aipo_engine::{CodeGenerationResult, ComprehensiveContext, DependencyValidationResult};
use aipo_utils::canonicalization::emit_jcs;
use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckOutput<'a> {
    can_generate: bool,
    #[serde(flatten)]
    result: &'a DependencyValidationResult,
}

/// Emit a dependency check as canonical JSON, with a `canGenerate` flag.
pub fn emit_check_json(result: &DependencyValidationResult) -> Result<String> {
    emit_jcs(&CheckOutput {
        can_generate: result.is_valid,
        result,
    })
    .context("Failed to emit check JSON")
}

pub fn emit_context_json(context: &ComprehensiveContext) -> Result<String> {
    emit_jcs(context).context("Failed to emit context JSON")
}

pub fn emit_result_json(result: &CodeGenerationResult) -> Result<String> {
    emit_jcs(result).context("Failed to emit generation result JSON")
}
