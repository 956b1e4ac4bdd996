//! Command-line front end for the crawl orchestrator.
//!
//! Launches crawls against the scrape API and follows them until they
//! finish, or lists past sessions.

mod config;
mod render;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use crawl_orchestrator::{
    BucketId, CrawlOrchestrator, HttpScrapeClient, LaunchFilters, OrchestratorEvent,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "crawlctl")]
#[command(about = "Launch and follow job board crawl sessions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the known crawl buckets
    Buckets,

    /// Launch a crawl and follow it until it finishes
    Run {
        /// Bucket to crawl (repeatable)
        #[arg(long = "bucket", short = 'b', required = true)]
        buckets: Vec<String>,
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        location: Option<String>,
        /// Only keep jobs located in India
        #[arg(long)]
        indian_only: bool,
        #[arg(long)]
        include_remote: bool,
    },

    /// Show recent crawl sessions
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show the backend's data verification report
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,crawl_orchestrator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Commands::Buckets = cli.command {
        render::print_catalog();
        return Ok(());
    }

    let config = Config::from_env().context("Failed to load configuration")?;
    let client = HttpScrapeClient::new(config.api_url.clone())
        .context("Failed to build scrape API client")?;
    client.set_token(config.api_token.clone());
    let orchestrator = CrawlOrchestrator::spawn(Arc::new(client), config.orchestrator.clone());

    let result = match cli.command {
        Commands::Buckets => Ok(()),
        Commands::Run {
            buckets,
            country,
            location,
            indian_only,
            include_remote,
        } => {
            let mut filters = LaunchFilters::new();
            if let Some(country) = country {
                filters = filters.with_country(country);
            }
            if let Some(location) = location {
                filters = filters.with_location(location);
            }
            if indian_only {
                filters = filters.indian_jobs_only();
            }
            if include_remote {
                filters = filters.with_remote(true);
            }
            let buckets: Vec<BucketId> = buckets.into_iter().map(BucketId::from).collect();
            run(&orchestrator, buckets, filters).await
        }
        Commands::History { limit } => {
            let sessions = orchestrator
                .list_history()
                .await
                .context("Failed to fetch crawl history")?;
            render::print_history(&sessions, limit);
            Ok(())
        }
        Commands::Verify => {
            let report = orchestrator
                .verify_data()
                .await
                .context("Failed to fetch verification report")?;
            render::print_verify_report(&report);
            Ok(())
        }
    };

    orchestrator.shutdown().await;
    result
}

async fn run(
    orchestrator: &CrawlOrchestrator,
    buckets: Vec<BucketId>,
    filters: LaunchFilters,
) -> Result<()> {
    for bucket in buckets.iter().filter(|b| !crawl_orchestrator::buckets::is_known(b)) {
        println!(
            "{} unknown bucket '{}', sending it anyway",
            "warning:".yellow(),
            bucket
        );
    }

    // Subscribe before launching so the first progress update is not missed.
    let mut events = orchestrator.subscribe();
    let session_id = orchestrator
        .start(buckets, filters)
        .await
        .context("Failed to launch crawl")?;
    println!("{} {}", "Launched session".green(), session_id.as_str().bold());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                orchestrator.stop_tracking();
                println!();
                println!(
                    "{} the crawl keeps running on the server",
                    "Stopped following;".yellow()
                );
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(OrchestratorEvent::ProgressUpdated { progress, .. }) => {
                    render::print_progress(&progress);
                }
                Ok(OrchestratorEvent::PollFetchFailed { error, .. }) => {
                    println!("{} {}", "poll failed:".red(), error);
                }
                Ok(OrchestratorEvent::SessionFinished(summary)) => {
                    render::print_summary(&summary);
                    return Ok(());
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => {
                    anyhow::bail!("orchestrator stopped before the session finished");
                }
            }
        }
    }
}
