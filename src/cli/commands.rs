//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: execute cycles and export telemetry
//! - pipeline: show the configured module sequence
//! - validate: check the configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// philoop - ordered module pipeline with per-cycle integration scoring
#[derive(Parser, Debug)]
#[command(name = "philoop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline for a number of cycles
    Run {
        /// Number of cycles (defaults to run.cycles from config)
        #[arg(short = 'n', long)]
        cycles: Option<usize>,

        /// Collect cross-prediction metrics every K cycles
        #[arg(short, long)]
        metrics_every: Option<usize>,

        /// Telemetry output file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seed for reproducible cycles
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Show the configured pipeline
    Pipeline,

    /// Validate the configuration and exit
    Validate,
}
