use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use eventsync::config::Config;
use eventsync::models::TargetArea;
use eventsync::storage::EventStatus;

mod commands;

#[derive(Parser)]
#[command(
    name = "eventsync",
    version,
    about = "Polite event listing sync from a rate-limited upstream",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// TOML configuration file (otherwise EVENTSYNC_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync over the configured (or given) areas
    Sync {
        /// Area to sync as key:City:Country; repeatable, overrides the configured list
        #[arg(short, long = "area")]
        areas: Vec<TargetArea>,

        /// SQLite database path
        #[arg(long)]
        db: Option<PathBuf>,

        /// Print the run result as JSON
        #[arg(long, default_value = "false")]
        json: bool,

        /// Write Prometheus metrics to this file after the run
        #[arg(long)]
        metrics_file: Option<PathBuf>,
    },

    /// List recently synced events
    Events {
        /// SQLite database path
        #[arg(long)]
        db: Option<PathBuf>,

        /// Number of events to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Only show events in this moderation status (draft, published, rejected)
        #[arg(short, long)]
        status: Option<EventStatus>,
    },

    /// Show the configured target areas
    Areas,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;

    // Initialize tracing/logging
    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    tracing::info!("eventsync starting");

    match cli.command {
        Commands::Sync {
            areas,
            db,
            json,
            metrics_file,
        } => {
            tracing::info!(
                areas = areas.len(),
                db = ?db,
                json = %json,
                "Starting sync command"
            );
            let success = commands::sync(commands::SyncParams {
                config,
                areas,
                db,
                json,
                metrics_file,
            })
            .await?;

            if !success {
                tracing::warn!("Sync finished with too many errors");
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Events { db, limit, status } => {
            let path = db.unwrap_or_else(|| config.database.path.clone());
            commands::events(&path, limit, status)?;
        }

        Commands::Areas => commands::areas(&config),
    }

    tracing::info!("eventsync completed successfully");
    Ok(ExitCode::SUCCESS)
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    }
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("eventsync=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new(format!("eventsync={level},warn"))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
