//! Shared helpers for orchestrator integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use crawl_orchestrator::testing::MockScrapeApi;
use crawl_orchestrator::{
    BucketId, CrawlOrchestrator, OrchestratorConfig, OrchestratorEvent, TerminalSummary,
};
use tokio::sync::broadcast;

/// Route library logs to the test writer. Run with:
/// RUST_LOG=crawl_orchestrator=debug cargo test -- --nocapture
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Tracking cadence without passive refresh, so fetch counts are exact.
pub fn tracking_only_config() -> OrchestratorConfig {
    OrchestratorConfig::default().with_passive_refresh(None)
}

pub fn spawn(api: &Arc<MockScrapeApi>, config: OrchestratorConfig) -> CrawlOrchestrator {
    init_tracing();
    CrawlOrchestrator::spawn(api.clone(), config)
}

pub fn buckets(names: &[&str]) -> Vec<BucketId> {
    names.iter().map(|n| BucketId::from(*n)).collect()
}

/// Receive events until one matches, returning it.
pub async fn wait_for<F>(
    events: &mut broadcast::Receiver<OrchestratorEvent>,
    mut matches: F,
) -> OrchestratorEvent
where
    F: FnMut(&OrchestratorEvent) -> bool,
{
    loop {
        let event = events.recv().await.expect("event stream closed");
        if matches(&event) {
            return event;
        }
    }
}

pub async fn wait_for_finish(
    events: &mut broadcast::Receiver<OrchestratorEvent>,
) -> TerminalSummary {
    match wait_for(events, |e| matches!(e, OrchestratorEvent::SessionFinished(_))).await {
        OrchestratorEvent::SessionFinished(summary) => summary,
        _ => unreachable!(),
    }
}

/// Advance (paused) time in small steps until `api` has served `count`
/// logs calls.
pub async fn wait_for_logs_calls(api: &MockScrapeApi, count: usize) {
    while api.logs_calls() < count {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
