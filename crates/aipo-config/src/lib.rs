//! Configuration for aipo
//!
//! Hierarchical configuration with discovery and precedence CLI > file >
//! defaults. The file is `.aipo/config.toml` with `[defaults]`, `[llm]`,
//! `[context]` and `[generation]` sections.

mod config;

pub use config::*;
