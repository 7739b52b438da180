//! Command implementations
//!
//! Each command prints its own output and returns `anyhow::Result`; run.rs
//! turns errors into a report and an exit code.

mod check;
mod context;
mod generate;
mod json_emit;
mod providers;

pub use check::execute_check_command;
pub use context::execute_context_command;
pub use generate::execute_generate_command;
pub use providers::execute_providers_command;
