//! CLI argument definitions and parsing structures

use aipo_utils::types::Stage;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

/// aipo - approval-gated, test-first code generation
#[derive(Parser, Debug)]
#[command(name = "aipo")]
#[command(about = "Generate tests and code for approved user stories using LLM providers")]
#[command(long_about = r#"
aipo runs the code generation stage of an approval-gated pipeline. It refuses
to call any AI provider until requirements, the project plan and the user
stories are all approved, then generates unit tests first and an
implementation written against those tests.

EXAMPLES:
  # Check whether code can be generated for a story generation
  aipo check --workspace workspace.json --story-generation <ID>

  # Show the context the AI would receive for story 2
  aipo context --workspace workspace.json --story-generation <ID> --story-index 2

  # Generate tests and implementation, writing files and a zip to ./out
  aipo generate --workspace workspace.json --story-generation <ID> --story-index 2 --out out

  # Use a specific provider and model
  aipo generate ... --model openrouter:anthropic/claude-sonnet-4

  # List providers and check their health
  aipo providers --health

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  The config file is discovered by searching upward from CWD for .aipo/config.toml
  Use --config to specify an explicit config file path
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Provider, or provider:model, to generate with
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Per-call timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the upstream approval chain
    Check {
        /// Workspace JSON file with the pipeline records
        #[arg(long)]
        workspace: PathBuf,

        /// Entity to validate; a story generation id for code generation
        #[arg(long = "story-generation", visible_alias = "entity")]
        entity: Uuid,

        /// Stage to validate
        #[arg(long, default_value = "code-generation")]
        stage: Stage,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the assembled context for one story
    Context {
        #[arg(long)]
        workspace: PathBuf,

        #[arg(long = "story-generation")]
        story_generation: Uuid,

        /// Zero-based index of the target story
        #[arg(long)]
        story_index: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate tests and implementation for one story
    Generate {
        #[arg(long)]
        workspace: PathBuf,

        #[arg(long = "story-generation")]
        story_generation: Uuid,

        #[arg(long)]
        story_index: usize,

        /// Directory for generated files, result.json and the zip
        #[arg(long)]
        out: PathBuf,

        /// Skip submitting the result to the review queue
        #[arg(long)]
        no_review: bool,
    },

    /// List registered providers in fallback order
    Providers {
        /// Check the health of each provider
        #[arg(long)]
        health: bool,

        /// List the models each provider offers
        #[arg(long)]
        models: bool,
    },
}

impl Commands {
    /// Name used in error reports.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Check { .. } => "check",
            Self::Context { .. } => "context",
            Self::Generate { .. } => "generate",
            Self::Providers { .. } => "providers",
        }
    }
}
