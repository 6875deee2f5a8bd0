//! Drover CLI entry point.

use anyhow::{Context, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use drover::cli::{commands, Cli, Commands};
use drover::domain::models::Config;
use drover::infrastructure::config::ConfigLoader;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load().context("Failed to load configuration")?,
    };

    // The coordinator daemon logs to rolling files; everything else to the
    // terminal. The guard must outlive the subscriber.
    let _guard = init_tracing(&config, matches!(cli.command, Commands::Coordinator));

    match cli.command {
        Commands::Load { file, dry_run } => commands::load::handle_load(config, &file, dry_run).await,
        Commands::Coordinator => commands::coordinator::handle_coordinator(config).await,
        Commands::Agent { id, workdir } => commands::agent::handle_agent(config, id, workdir).await,
        Commands::Status => commands::status::handle_status(config).await,
        Commands::Cleanup => commands::cleanup::handle_cleanup(config).await,
    }
}

fn init_tracing(config: &Config, daemon: bool) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    let json = config.logging.format == "json";

    if daemon {
        let appender = tracing_appender::rolling::daily(".drover/logs", "coordinator.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        if json {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .json()
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
        }
        return Some(guard);
    }

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    None
}
