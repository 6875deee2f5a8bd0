//! CLI interface module.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Multi-agent task orchestrator: DAG phase scheduling, task leasing, and
/// serialized branch integration.
#[derive(Parser, Debug)]
#[command(name = "drover", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (defaults to the .drover/ hierarchy plus DROVER_* env)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a backlog file, compile phases, and seed the state store
    Load {
        /// Backlog YAML file
        file: PathBuf,
        /// Print the phase plan without writing to the store
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the coordinator: HTTP API, sequential merge worker, and reaper
    Coordinator,
    /// Run an agent runtime against the coordinator
    Agent {
        /// Preferred agent id (defaults to a generated one)
        #[arg(long)]
        id: Option<String>,
        /// Working tree for this agent (defaults to the current directory)
        #[arg(long)]
        workdir: Option<PathBuf>,
    },
    /// Show phase, task, agent, and merge-queue status
    Status,
    /// Reset tasks orphaned by dead agents (one reaper sweep)
    Cleanup,
}
