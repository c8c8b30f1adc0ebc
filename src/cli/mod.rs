//! CLI module for philoop - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running the pipeline,
//! listing it, and validating configuration.

pub mod commands;

pub use commands::Cli;
