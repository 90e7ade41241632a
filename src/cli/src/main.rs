//! Taskhive CLI - inspect and control a running Taskhive server.
//!
//! Provides stats, worker, task, listener and health commands over the
//! server's `/workers` and `/health` endpoints.

mod client;
mod commands;
mod models;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{health, listeners, stats, tasks, workers};
use output::OutputFormat;

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Taskhive - background task queue CLI
#[derive(Parser)]
#[command(
    name = "taskhive",
    version,
    about = "Taskhive - background task queue and worker pool",
    long_about = "CLI tool for inspecting and controlling the workers, tasks and listeners of a Taskhive server.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(long, global = true, env = "TASKHIVE_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the stats snapshot
    Stats,

    /// Worker operations
    #[command(subcommand)]
    Workers(workers::WorkerCommands),

    /// Task operations
    #[command(subcommand)]
    Tasks(tasks::TaskCommands),

    /// Listener operations
    #[command(subcommand)]
    Listeners(listeners::ListenerCommands),

    /// Check server health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let client = client::ApiClient::new(&cli.api_url)?;
    let format = cli.output;

    let result = match cli.command {
        Commands::Stats => stats::execute(&client, format).await,
        Commands::Workers(cmd) => workers::execute(cmd, &client, format).await,
        Commands::Tasks(cmd) => tasks::execute(cmd, &client, format).await,
        Commands::Listeners(cmd) => listeners::execute(cmd, &client, format).await,
        Commands::Health => health::execute(&client, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
