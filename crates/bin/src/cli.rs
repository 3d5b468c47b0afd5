//! CLI argument definitions for the Concord binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

/// Concord conflict resolution engine
#[derive(Parser, Debug)]
#[command(name = "concord")]
#[command(about = "Concord: conflict detection and resolution for collaborative documents")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show summary information about a persisted engine state
    Info(InfoArgs),
    /// Replay a scenario file through an in-memory engine
    Simulate(SimulateArgs),
    /// Policy book tooling
    Policy(PolicyArgs),
}

/// Arguments for the info command
#[derive(clap::Args, Debug)]
pub struct InfoArgs {
    /// Path to a persisted engine state file
    #[arg(short, long, env = "CONCORD_STATE")]
    pub state: PathBuf,
}

/// Arguments for the simulate command
#[derive(clap::Args, Debug)]
pub struct SimulateArgs {
    /// Path to the scenario file to replay
    #[arg(short, long)]
    pub scenario: PathBuf,

    /// Policy book overriding the scenario's embedded policies
    #[arg(short, long, env = "CONCORD_POLICY")]
    pub policy: Option<PathBuf>,

    /// Persist the final engine state to this file
    #[arg(long)]
    pub save_state: Option<PathBuf>,
}

/// Arguments for the policy subcommands
#[derive(clap::Args, Debug)]
pub struct PolicyArgs {
    #[command(subcommand)]
    pub command: PolicyCommands,
}

#[derive(Subcommand, Debug)]
pub enum PolicyCommands {
    /// Validate a policy book and report the effective strategies
    Check(PolicyCheckArgs),
}

/// Arguments for the policy check command
#[derive(clap::Args, Debug)]
pub struct PolicyCheckArgs {
    /// Path to the policy book file
    #[arg(short, long, env = "CONCORD_POLICY")]
    pub policy: PathBuf,
}
