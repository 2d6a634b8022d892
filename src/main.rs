use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;
mod config;
mod consensus;
mod error;
mod gateway;
mod issue;
mod output;
mod parser;
mod phase;
mod store;
mod synthesis;
mod workflow;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing - only show logs with --verbose
    let filter = if cli.verbose {
        EnvFilter::new("conclave=debug")
    } else {
        EnvFilter::new("conclave=warn")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Run(args) => cli::run::execute(args).await,
        Commands::Resume(args) => cli::resume::execute(args).await,
        Commands::Show(args) => cli::show::execute(args),
        Commands::Schema => cli::schema::execute(),
    }
}
