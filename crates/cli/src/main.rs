//! cachelm CLI — the main entry point.
//!
//! Commands:
//! - `run`          — Answer one utterance (optionally on a persisted thread)
//! - `manual-stats` — Show the manual's size and prompt fingerprints
//! - `threads`      — List or delete persisted threads

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "cachelm",
    about = "Route questions to manual-grounded experts",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one user utterance
    Run {
        /// The user utterance
        #[arg(short, long, required_unless_present = "messages", conflicts_with = "messages")]
        input: Option<String>,

        /// JSON file holding this turn's messages (list-of-blocks content allowed)
        #[arg(long)]
        messages: Option<PathBuf>,

        /// Persist the conversation under this thread id
        #[arg(long)]
        thread_id: Option<String>,

        /// SQLite file for thread checkpoints
        #[arg(long)]
        checkpoint_db: Option<PathBuf>,

        /// Print the full turn state as JSON
        #[arg(long)]
        json: bool,

        /// Print per-expert TTFT and latency
        #[arg(long)]
        show_metrics: bool,
    },

    /// Show manual size and prompt fingerprints
    ManualStats,

    /// List persisted threads, or delete one
    Threads {
        /// SQLite file for thread checkpoints
        #[arg(long)]
        checkpoint_db: Option<PathBuf>,

        /// Delete this thread instead of listing
        #[arg(long)]
        delete: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so `--json` output stays clean
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            input,
            messages,
            thread_id,
            checkpoint_db,
            json,
            show_metrics,
        } => {
            commands::run::run(commands::run::RunArgs {
                input,
                messages,
                thread_id,
                checkpoint_db,
                json,
                show_metrics,
            })
            .await?
        }
        Commands::ManualStats => commands::manual_stats::run().await?,
        Commands::Threads {
            checkpoint_db,
            delete,
        } => commands::threads::run(checkpoint_db, delete).await?,
    }

    Ok(())
}
