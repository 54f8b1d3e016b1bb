//! Binary entry point: parse arguments, initialize logging, run the engine,
//! map the outcome to a process exit code. All crawl logic lives in the
//! library (`src/engine.rs` and below); this file is the thin adapter §6
//! describes.

use clap::Parser;

use atlas_crawler::cli::{Cli, Command};
use atlas_crawler::Engine;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let Command::Crawl(args) = cli.command;

    let config = match args.into_engine_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid arguments: {err}");
            std::process::exit(10);
        }
    };

    match Engine::new(config).run().await {
        Ok(outcome) => {
            tracing::info!(
                archive = %outcome.archive_path.display(),
                pages = outcome.pages_crawled,
                errors = outcome.errors_count,
                reason = ?outcome.completion_reason,
                "crawl finished"
            );
            std::process::exit(outcome.exit_code);
        }
        Err(err) => {
            eprintln!("crawl failed: {err:#}");
            std::process::exit(10);
        }
    }
}
