//! Tunedeck CLI - kiosk jukebox request orchestration
//!
//! A command-line interface for managing API credentials, inspecting
//! rate-limit windows, and running searches through the request queue.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tunedeck")]
#[command(author, version, about = "Kiosk jukebox orchestration CLI", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: table (default) or json
    #[arg(long, global = true, default_value = "table")]
    format: output::OutputFormat,

    /// Suppress progress messages
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Override credential store path (or set TUNEDECK_STORE env var)
    #[arg(long, env = "TUNEDECK_STORE", global = true)]
    store: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a search through the queue, limiter and cache
    Search(commands::search::SearchArgs),

    /// Manage API credentials
    Credentials {
        #[command(subcommand)]
        action: commands::credentials::CredentialsAction,
    },

    /// Inspect rate-limit windows
    Limits {
        #[command(subcommand)]
        action: commands::limits::LimitsAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let store_path = commands::resolve_store_path(cli.store.as_deref())?;
    let ctx = commands::Context {
        store_path,
        format: cli.format,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Search(args) => commands::search::execute(&ctx, args).await,
        Commands::Credentials { action } => commands::credentials::execute(&ctx, action).await,
        Commands::Limits { action } => commands::limits::execute(&ctx, action).await,
    }
}
