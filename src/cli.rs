// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines the check and run subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "berth")]
#[command(about = "Run containers from a spec on a local engine or a cluster")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate a container spec, then print a summary
    Check {
        /// Path to the spec file
        spec: PathBuf,
    },

    /// Start a spec on the local engine and wait for it to finish
    Run {
        /// Path to the spec file
        spec: PathBuf,

        /// Give up waiting after this long (e.g. 30s, 5m)
        #[arg(short, long, value_parser = parse_duration)]
        timeout: Option<Duration>,

        /// Leave the container in place after it finishes
        #[arg(long)]
        keep: bool,

        /// Timeout settings file
        #[arg(long)]
        settings: Option<PathBuf>,
    },
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}
