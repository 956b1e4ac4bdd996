//! Crawl-session orchestrator for the job board.
//!
//! Starts multi-bucket crawls through the scrape REST API, polls the session
//! collection while one is running, and derives per-bucket progress from the
//! coarse session record.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use crawl_orchestrator::{CrawlOrchestrator, HttpScrapeClient, LaunchFilters, OrchestratorConfig};
//!
//! let api = Arc::new(HttpScrapeClient::from_env()?);
//! let orchestrator = CrawlOrchestrator::spawn(api, OrchestratorConfig::default());
//!
//! let session_id = orchestrator
//!     .start(vec!["fresher".into()], LaunchFilters::new().indian_jobs_only())
//!     .await?;
//!
//! let mut updates = orchestrator.watch();
//! while updates.changed().await.is_ok() {
//!     let snapshot = updates.borrow().clone();
//!     println!("{}% complete", snapshot.progress.percent_complete());
//! }
//! ```

pub mod aggregator;
pub mod buckets;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod orchestrator;
pub mod testing;
pub mod types;

pub use aggregator::{derive, AggregateStats, BucketProgress, BucketStatus, SessionProgress};
pub use buckets::{BucketId, BucketInfo, BucketKind, CATALOG};
pub use client::{HttpScrapeClient, ScrapeApi};
pub use config::OrchestratorConfig;
pub use error::{ApiError, LaunchError, PollError, Result};
pub use events::{OrchestratorEvent, TerminalSummary};
pub use history::SessionHistory;
pub use orchestrator::{CrawlOrchestrator, OrchestratorSnapshot, TrackingPhase};
pub use types::{
    CrawlSession, LaunchFilters, RunRequest, RunResponse, SessionAnomaly, SessionId,
    SessionStatus, VerifyDataReport,
};
