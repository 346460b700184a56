//! Revise CLI - study decks offline and keep them in sync
//!
//! Every mutation lands in the local cache and the pending-change queue
//! first; `revise sync` and `revise daemon` push it to the API.

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::common::CommandContext;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::daemon::run_daemon;
use crate::commands::deck::run_deck;
use crate::commands::generate::run_generate;
use crate::commands::knowledge::run_knowledge;
use crate::commands::sync::run_sync;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive = "revise=info"
        .parse()
        .map_err(|error| CliError::Config(format!("Invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();
    let db_path = cli.db_path;
    let context = || CommandContext::resolve(profile, db_path.clone());

    match cli.command {
        Commands::Deck { command } => run_deck(command, &context()?).await,
        Commands::Knowledge { command } => run_knowledge(command, &context()?).await,
        Commands::Sync { command } => run_sync(command, &context()?).await,
        Commands::Daemon { interval } => run_daemon(interval, &context()?).await,
        Commands::Generate { command } => run_generate(command, &context()?).await,
        Commands::Auth { command } => run_auth(command, profile).await,
        Commands::Config { command } => run_config(command, profile),
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
    }
}
