use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod tasks;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (output to stderr, initialize only once)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run => commands::run(&cli.config, false).await,
        Commands::RunOnce => commands::run(&cli.config, true).await,
        Commands::Status => commands::status(&cli.config),
    }
}
