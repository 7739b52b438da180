//! CLI entry point and dispatch logic
//!
//! `run()` parses arguments, discovers configuration, builds the tokio
//! runtime, dispatches to a command and prints every error itself.

use aipo_config::{CliArgs, Config};
use aipo_utils::error::{AipoError, ConfigError, GenerationError, LlmError, render_for_user};
use aipo_utils::exit_codes::ExitCode;
use aipo_utils::logging::init_tracing;
use aipo_utils::redaction::redact_error_message;
use clap::Parser;

use super::args::{Cli, Commands};
use super::commands;

/// Main CLI execution function.
///
/// Prints all output, including errors, and returns the exit code to use
/// on failure. main.rs only calls `std::process::exit`.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("warning: logging was not initialised: {e}");
    }
    tracing::debug!(version = crate::aipo_version(), "aipo starting");

    let cli_args = CliArgs {
        config_path: cli.config.clone(),
        selected_model: cli.model.clone(),
        timeout_secs: cli.timeout,
    };

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            let report = match err.downcast_ref::<ConfigError>() {
                Some(config_error) => render_for_user(config_error),
                None => format!("error: {err:#}"),
            };
            eprintln!("{}", redact_error_message(&report));
            return Err(ExitCode::CLI_ARGS);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let operation = cli.command.operation();
    let verbose = cli.verbose;
    let result = rt.block_on(async {
        match cli.command {
            Commands::Check {
                workspace,
                entity,
                stage,
                json,
            } => commands::execute_check_command(&workspace, entity, stage, json).await,
            Commands::Context {
                workspace,
                story_generation,
                story_index,
                json,
            } => {
                commands::execute_context_command(
                    &workspace,
                    story_generation,
                    story_index,
                    json,
                    &config,
                )
                .await
            }
            Commands::Generate {
                workspace,
                story_generation,
                story_index,
                out,
                no_review,
            } => {
                commands::execute_generate_command(
                    &workspace,
                    story_generation,
                    story_index,
                    &out,
                    !no_review,
                    &config,
                )
                .await
            }
            Commands::Providers { health, models } => {
                commands::execute_providers_command(health, models, &config).await
            }
        }
    });

    match result {
        Ok(()) => Ok(()),
        Err(error) => Err(report_error(&error, operation, verbose)),
    }
}

/// Print `error` for the user and pick the exit code.
fn report_error(error: &anyhow::Error, operation: &str, verbose: bool) -> ExitCode {
    let (report, code) = if let Some(e) = error.downcast_ref::<AipoError>() {
        (e.display_for_user(), e.to_exit_code())
    } else if let Some(e) = error.downcast_ref::<GenerationError>() {
        (render_for_user(e), ExitCode::from(e))
    } else if let Some(e) = error.downcast_ref::<LlmError>() {
        (render_for_user(e), ExitCode::from(e))
    } else if let Some(e) = error.downcast_ref::<ConfigError>() {
        (render_for_user(e), ExitCode::CLI_ARGS)
    } else {
        (format!("error: {operation} failed: {error:#}"), ExitCode::INTERNAL)
    };

    eprintln!("{}", redact_error_message(&report));
    if code == ExitCode::INTERNAL && !verbose {
        eprintln!("\n  Run with --verbose for more detailed output");
    }
    code
}
