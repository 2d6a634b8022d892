pub mod resume;
pub mod run;
pub mod schema;
pub mod show;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "conclave")]
#[command(
    author,
    version,
    about = "Multi-agent review orchestration with consensus gating"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a workflow run over an artifact
    Run(RunArgs),

    /// Resume a run that is awaiting a decision or was interrupted
    Resume(ResumeArgs),

    /// Show persisted runs and their artifacts
    Show(ShowArgs),

    /// Print JSON Schema for config validation
    Schema,
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    /// Artifact to review (a plan or change description)
    #[arg(value_name = "FILE")]
    pub artifact: PathBuf,

    /// Path to config file
    #[arg(short, long, default_value = "conclave.yaml")]
    pub config: PathBuf,

    /// Override the workflow pattern
    #[arg(long)]
    pub pattern: Option<String>,

    /// Run specific reviewers only (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub reviewers: Option<Vec<String>>,

    /// Override reviewer call timeout in seconds
    #[arg(long)]
    pub timeout_sec: Option<u64>,

    /// Exit 1 unless the run completes (CI mode)
    #[arg(long)]
    pub fail_on_incomplete: bool,
}

#[derive(Parser, Clone)]
pub struct ResumeArgs {
    /// Run id (full or unique prefix)
    #[arg(value_name = "RUN_ID")]
    pub run_id: String,

    /// Path to config file
    #[arg(short, long, default_value = "conclave.yaml")]
    pub config: PathBuf,

    /// Answer non-interactively: proceed, revise, or abort
    #[arg(long)]
    pub decision: Option<String>,
}

#[derive(Parser, Clone)]
pub struct ShowArgs {
    /// Run id to inspect (lists all runs when omitted)
    #[arg(value_name = "RUN_ID")]
    pub run_id: Option<String>,

    /// Path to config file
    #[arg(short, long, default_value = "conclave.yaml")]
    pub config: PathBuf,

    /// Print the raw run record as JSON
    #[arg(long)]
    pub json: bool,
}
