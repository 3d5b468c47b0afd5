//! Concord CLI entry point.

mod cli;
mod commands;
mod output;
mod scenario;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, PolicyCommands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("concord=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Info(args) => commands::info::run(args, cli.output).await,
        Commands::Simulate(args) => commands::simulate::run(args, cli.output).await,
        Commands::Policy(args) => match &args.command {
            PolicyCommands::Check(check) => commands::policy::run(check, cli.output),
        },
    }
}
