//! CLI tests module
//!
//! Argument parsing and command naming. End-to-end runs of the binary live
//! in tests/cli_commands.rs.

use super::*;
use aipo_utils::types::Stage;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use uuid::Uuid;

const ID: &str = "6f1c1d1e-8a51-4c3e-9a53-0c2b6f7d9a10";

#[test]
fn test_cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn test_check_defaults_to_code_generation() {
    let cli = Cli::try_parse_from([
        "aipo",
        "check",
        "--workspace",
        "ws.json",
        "--story-generation",
        ID,
    ])
    .unwrap();

    match cli.command {
        Commands::Check {
            workspace,
            entity,
            stage,
            json,
        } => {
            assert_eq!(workspace, PathBuf::from("ws.json"));
            assert_eq!(entity, Uuid::parse_str(ID).unwrap());
            assert_eq!(stage, Stage::CodeGeneration);
            assert!(!json);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_check_accepts_entity_alias_and_stage() {
    let cli = Cli::try_parse_from([
        "aipo",
        "check",
        "--workspace",
        "ws.json",
        "--entity",
        ID,
        "--stage",
        "story-generation",
        "--json",
    ])
    .unwrap();

    assert!(matches!(
        cli.command,
        Commands::Check {
            stage: Stage::StoryGeneration,
            json: true,
            ..
        }
    ));
}

#[test]
fn test_unknown_stage_is_rejected() {
    let err = Cli::try_parse_from([
        "aipo",
        "check",
        "--workspace",
        "ws.json",
        "--story-generation",
        ID,
        "--stage",
        "deployment",
    ])
    .unwrap_err();
    assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
}

#[test]
fn test_malformed_uuid_is_rejected() {
    let result = Cli::try_parse_from([
        "aipo",
        "context",
        "--workspace",
        "ws.json",
        "--story-generation",
        "not-a-uuid",
        "--story-index",
        "0",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_generate_with_global_flags() {
    let cli = Cli::try_parse_from([
        "aipo",
        "generate",
        "--workspace",
        "ws.json",
        "--story-generation",
        ID,
        "--story-index",
        "2",
        "--out",
        "out",
        "--no-review",
        "--model",
        "openrouter:anthropic/claude-sonnet-4",
        "--timeout",
        "90",
        "-v",
    ])
    .unwrap();

    assert_eq!(cli.model.as_deref(), Some("openrouter:anthropic/claude-sonnet-4"));
    assert_eq!(cli.timeout, Some(90));
    assert!(cli.verbose);
    match cli.command {
        Commands::Generate {
            story_index,
            out,
            no_review,
            ..
        } => {
            assert_eq!(story_index, 2);
            assert_eq!(out, PathBuf::from("out"));
            assert!(no_review);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_generate_requires_out() {
    let err = Cli::try_parse_from([
        "aipo",
        "generate",
        "--workspace",
        "ws.json",
        "--story-generation",
        ID,
        "--story-index",
        "0",
    ])
    .unwrap_err();
    assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
}

#[test]
fn test_operation_names() {
    let providers = Cli::try_parse_from(["aipo", "providers", "--health"]).unwrap();
    assert_eq!(providers.command.operation(), "providers");

    let context = Cli::try_parse_from([
        "aipo",
        "context",
        "--workspace",
        "ws.json",
        "--story-generation",
        ID,
        "--story-index",
        "0",
    ])
    .unwrap();
    assert_eq!(context.command.operation(), "context");
}
