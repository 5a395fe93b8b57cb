//! Soliplex - installation configuration tooling
//!
//! Main entry point for the Soliplex CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{check, completions, environment, oidc, rooms, secrets};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Soliplex - inspect and validate an installation's configuration
#[derive(Parser)]
#[command(name = "soliplex")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Installation file, or a directory holding installation.yaml
    #[arg(
        short = 'c',
        long,
        global = true,
        env = "SOLIPLEX_INSTALLATION_PATH"
    )]
    pub installation_path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that every secret and environment variable resolves
    CheckConfig,

    /// List secrets declared by the installation
    ListSecrets,

    /// List environment variables declared by the installation
    ListEnvironment,

    /// List configured rooms
    ListRooms,

    /// List configured completion endpoints
    ListCompletions,

    /// List configured OIDC auth systems
    ListOidc,
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "soliplex=debug,soliplex_config=debug,info"
    } else {
        "soliplex=info,soliplex_config=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let ctx = commands::Context {
        installation_path: cli.installation_path,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::CheckConfig => check::run(&ctx),
        Commands::ListSecrets => secrets::run(&ctx),
        Commands::ListEnvironment => environment::run(&ctx),
        Commands::ListRooms => rooms::run(&ctx),
        Commands::ListCompletions => completions::run(&ctx),
        Commands::ListOidc => oidc::run(&ctx),
    }
}
