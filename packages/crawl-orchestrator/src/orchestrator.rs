//! Crawl-session orchestrator.
//!
//! Owns one tracked session at a time and a single background worker that
//! polls the session collection:
//!
//! ```text
//! CrawlOrchestrator
//!     │
//!     ├─► start()        POST /scrape/run, enter tracking
//!     │
//!     └─► worker loop    (one per orchestrator)
//!             ├─► wait poll_interval (tracking) or passive_refresh (idle)
//!             ├─► GET /scrape/logs (one in flight, slot wait + fetch bounded by request_timeout)
//!             ├─► drop the result (or failure) if tracking changed while it was in flight
//!             ├─► derive per-bucket progress, publish snapshot + events
//!             └─► terminal status: clear tracking, publish TerminalSummary
//! ```
//!
//! Poll failures never stop the loop; they are logged and retried on the
//! next tick. Dropping or shutting down the orchestrator cancels the worker.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::{derive, SessionProgress};
use crate::buckets::BucketId;
use crate::client::ScrapeApi;
use crate::config::OrchestratorConfig;
use crate::error::{ApiError, LaunchError, PollError};
use crate::events::{OrchestratorEvent, TerminalSummary};
use crate::history::SessionHistory;
use crate::types::{CrawlSession, LaunchFilters, RunRequest, SessionId, VerifyDataReport};

/// What the orchestrator is doing right now.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TrackingPhase {
    #[default]
    Idle,
    /// A launch request is in flight.
    Launching,
    Tracking { session_id: SessionId },
}

impl TrackingPhase {
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            TrackingPhase::Tracking { session_id } => Some(session_id),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, TrackingPhase::Idle)
    }
}

/// Everything a presentation layer needs, published after every change.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorSnapshot {
    pub phase: TrackingPhase,
    /// Buckets the caller currently has selected
    pub selected: Vec<BucketId>,
    /// Latest record of the tracked (or most recently finished) session
    pub session: Option<CrawlSession>,
    pub progress: SessionProgress,
    pub last_summary: Option<TerminalSummary>,
    pub history: SessionHistory,
    /// Error of the last failed tick, cleared by the next successful one
    pub last_error: Option<String>,
}

struct State {
    /// Bumped whenever tracking starts or ends. Ticks compare against it.
    generation: u64,
    view: OrchestratorSnapshot,
}

/// What a tick was fetching for, captured before the fetch.
struct Ticket {
    generation: u64,
    session_id: Option<SessionId>,
    buckets: Vec<BucketId>,
}

struct Inner {
    api: Arc<dyn ScrapeApi>,
    config: OrchestratorConfig,
    state: Mutex<State>,
    /// Serializes logs fetches so at most one is in flight.
    fetch_lock: tokio::sync::Mutex<()>,
    wake: Notify,
    events: broadcast::Sender<OrchestratorEvent>,
    snapshot: watch::Sender<OrchestratorSnapshot>,
}

/// Launches crawl sessions and tracks one of them at a time.
///
/// # Example
///
/// ```rust,ignore
/// use crawl_orchestrator::{CrawlOrchestrator, HttpScrapeClient, LaunchFilters, OrchestratorConfig};
///
/// let api = Arc::new(HttpScrapeClient::from_env()?);
/// let orchestrator = CrawlOrchestrator::spawn(api, OrchestratorConfig::default());
/// let mut events = orchestrator.subscribe();
///
/// orchestrator
///     .start(vec!["fresher".into(), "cloud".into()], LaunchFilters::new().with_country("India"))
///     .await?;
///
/// while let Ok(event) = events.recv().await {
///     if let OrchestratorEvent::SessionFinished(summary) = event {
///         println!("{} new jobs", summary.stats.total_jobs_added);
///         break;
///     }
/// }
/// orchestrator.shutdown().await;
/// ```
pub struct CrawlOrchestrator {
    inner: Arc<Inner>,
    shutdown: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl CrawlOrchestrator {
    /// Create an orchestrator and spawn its polling worker on the current
    /// tokio runtime.
    pub fn spawn(api: Arc<dyn ScrapeApi>, config: OrchestratorConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (snapshot, _) = watch::channel(OrchestratorSnapshot::default());

        let inner = Arc::new(Inner {
            api,
            config,
            state: Mutex::new(State {
                generation: 0,
                view: OrchestratorSnapshot::default(),
            }),
            fetch_lock: tokio::sync::Mutex::new(()),
            wake: Notify::new(),
            events,
            snapshot,
        });

        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(Inner::run(inner.clone(), shutdown.clone()));

        Self {
            inner,
            shutdown,
            worker: Some(worker),
        }
    }

    /// Launch a crawl over `buckets` and start tracking it.
    ///
    /// Issues exactly one launch request and never retries. Rejected without
    /// any request when `buckets` is empty or a session is already launching
    /// or tracked.
    pub async fn start(
        &self,
        buckets: Vec<BucketId>,
        filters: LaunchFilters,
    ) -> Result<SessionId, LaunchError> {
        let buckets = dedupe(buckets);
        if buckets.is_empty() {
            return Err(LaunchError::EmptySelection);
        }

        {
            let mut state = self.inner.lock_state();
            if !state.view.phase.is_idle() {
                return Err(LaunchError::SessionAlreadyActive);
            }
            state.view.phase = TrackingPhase::Launching;
            state.view.selected = buckets.clone();
            self.inner.publish(&state);
        }

        let mut guard = LaunchGuard {
            inner: &self.inner,
            armed: true,
        };

        let request = RunRequest::new(buckets.clone(), self.inner.config.triggered_by.clone(), filters);
        info!(buckets = ?buckets, "launching crawl session");
        let outcome = self.inner.api.run(&request).await;
        guard.armed = false;

        let mut state = self.inner.lock_state();
        let response = match outcome {
            Ok(response) => response,
            Err(ApiError::Api { status, message }) => {
                warn!(status, message = %message, "crawl launch rejected");
                state.view.phase = TrackingPhase::Idle;
                self.inner.publish(&state);
                return Err(LaunchError::LaunchRejected { status, message });
            }
            Err(e) => {
                warn!(error = %e, "crawl launch failed");
                state.view.phase = TrackingPhase::Idle;
                self.inner.publish(&state);
                return Err(LaunchError::Api(e));
            }
        };

        let session_id = match response.session_id {
            Some(id) if response.success != Some(false) => id,
            _ => {
                let message = response
                    .message
                    .unwrap_or_else(|| "no session id in launch response".to_string());
                warn!(message = %message, "crawl launch rejected");
                state.view.phase = TrackingPhase::Idle;
                self.inner.publish(&state);
                return Err(LaunchError::LaunchRejected {
                    status: 200,
                    message,
                });
            }
        };

        state.generation += 1;
        state.view.phase = TrackingPhase::Tracking {
            session_id: session_id.clone(),
        };
        state.view.session = None;
        state.view.progress = SessionProgress::default();
        state.view.last_error = None;
        info!(session_id = %session_id, "crawl session launched, tracking progress");
        self.inner.emit(OrchestratorEvent::SessionLaunched {
            session_id: session_id.clone(),
            buckets,
        });
        self.inner.publish(&state);
        drop(state);

        self.inner.wake.notify_one();
        Ok(session_id)
    }

    /// Abandon the tracked session without waiting for it to finish.
    ///
    /// A fetch already in flight for it is discarded when it settles.
    pub fn stop_tracking(&self) -> Option<SessionId> {
        let mut state = self.inner.lock_state();
        let TrackingPhase::Tracking { session_id } = state.view.phase.clone() else {
            return None;
        };

        state.generation += 1;
        state.view.phase = TrackingPhase::Idle;
        info!(session_id = %session_id, "stopped tracking crawl session");
        self.inner.emit(OrchestratorEvent::TrackingStopped {
            session_id: session_id.clone(),
        });
        self.inner.publish(&state);
        drop(state);

        self.inner.wake.notify_one();
        Some(session_id)
    }

    /// Replace the caller's bucket selection. Takes effect from the next
    /// tick; a tick in progress keeps the list it started with.
    pub fn set_selected_buckets(&self, buckets: Vec<BucketId>) {
        let mut state = self.inner.lock_state();
        state.view.selected = dedupe(buckets);
        self.inner.publish(&state);
    }

    /// Fetch the session history now, independent of tracking.
    ///
    /// Shares the poller's single fetch slot and `request_timeout`, so a slow
    /// backend delays the next tick by at most one timeout.
    pub async fn list_history(&self) -> Result<Vec<CrawlSession>, PollError> {
        let sessions = self.inner.fetch_logs().await?;

        let mut state = self.inner.lock_state();
        state.view.history.replace(sessions.clone());
        self.inner.emit(OrchestratorEvent::HistoryRefreshed {
            sessions: sessions.len(),
        });
        self.inner.publish(&state);
        Ok(sessions)
    }

    /// Last fetched history without a network call.
    pub fn cached_history(&self) -> SessionHistory {
        self.inner.lock_state().view.history.clone()
    }

    pub async fn verify_data(&self) -> Result<VerifyDataReport, ApiError> {
        self.inner.api.verify_data().await
    }

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        self.inner.lock_state().view.clone()
    }

    /// Receiver that sees every published snapshot.
    pub fn watch(&self) -> watch::Receiver<OrchestratorSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.inner.events.subscribe()
    }

    pub fn tracked_session(&self) -> Option<SessionId> {
        self.inner.lock_state().view.phase.session_id().cloned()
    }

    /// Cancel the worker and wait for it to exit. No tick fires afterwards.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!(error = %e, "crawl orchestrator worker ended abnormally");
            }
        }
    }
}

impl Drop for CrawlOrchestrator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Returns the orchestrator to idle if a launch is abandoned mid-request.
struct LaunchGuard<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl Drop for LaunchGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.inner.lock_state();
        if state.view.phase == TrackingPhase::Launching {
            debug!("crawl launch abandoned before the backend answered");
            state.view.phase = TrackingPhase::Idle;
            self.inner.publish(&state);
        }
    }
}

impl Inner {
    async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            passive_refresh_ms = self.config.passive_refresh.map(|d| d.as_millis() as u64),
            "crawl orchestrator worker starting"
        );

        loop {
            let tracking = self.lock_state().view.phase.session_id().is_some();
            let delay = self.config.next_delay(tracking);

            tokio::select! {
                _ = shutdown.cancelled() => break,
                // Tracking changed; recompute the delay.
                _ = self.wake.notified() => continue,
                _ = sleep_or_park(delay) => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.tick() => {}
            }
        }

        info!("crawl orchestrator worker stopped");
    }

    async fn tick(&self) {
        let ticket = {
            let state = self.lock_state();
            Ticket {
                generation: state.generation,
                session_id: state.view.phase.session_id().cloned(),
                buckets: state.view.selected.clone(),
            }
        };

        match self.fetch_logs().await {
            Ok(sessions) => self.apply(ticket, sessions),
            Err(e) => {
                let mut state = self.lock_state();
                if state.generation != ticket.generation {
                    debug!(error = %e, "ignoring failed poll for abandoned tracking");
                    self.discard_stale(&state, ticket.session_id);
                    return;
                }

                warn!(
                    session_id = ticket.session_id.as_ref().map(|id| id.as_str()),
                    error = %e,
                    "crawl progress poll failed, retrying next tick"
                );
                state.view.last_error = Some(e.to_string());
                self.emit(OrchestratorEvent::PollFetchFailed {
                    session_id: ticket.session_id,
                    error: e.to_string(),
                });
                self.publish(&state);
            }
        }
    }

    /// One logs fetch. Waiting for the fetch slot counts against
    /// `request_timeout`, and a timed-out fetch releases the slot.
    async fn fetch_logs(&self) -> Result<Vec<CrawlSession>, PollError> {
        let timeout = self.config.request_timeout;
        let fetch = async {
            let _slot = self.fetch_lock.lock().await;
            self.api.logs().await
        };
        match tokio::time::timeout(timeout, fetch).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(PollError::TimedOut(timeout)),
        }
    }

    fn apply(&self, ticket: Ticket, sessions: Vec<CrawlSession>) {
        let mut state = self.lock_state();
        if state.generation == ticket.generation {
            state.view.last_error = None;
        }

        let record = ticket
            .session_id
            .as_ref()
            .and_then(|id| sessions.iter().find(|s| &s.session_id == id))
            .cloned();
        let count = sessions.len();
        state.view.history.replace(sessions);
        self.emit(OrchestratorEvent::HistoryRefreshed { sessions: count });

        let Some(fetched_for) = ticket.session_id else {
            self.publish(&state);
            return;
        };

        if state.generation != ticket.generation
            || state.view.phase.session_id() != Some(&fetched_for)
        {
            self.discard_stale(&state, Some(fetched_for));
            return;
        }

        let Some(record) = record else {
            debug!(session_id = %fetched_for, "tracked session not listed yet");
            self.publish(&state);
            return;
        };

        for anomaly in record.anomalies() {
            warn!(session_id = %fetched_for, anomaly = ?anomaly, "inconsistent bucket sets in session record");
        }

        let progress = derive(&record, &ticket.buckets);
        debug!(
            session_id = %fetched_for,
            status = %record.status,
            completed = progress.stats.completed_buckets,
            failed = progress.stats.failed_buckets,
            "crawl progress"
        );
        state.view.progress = progress.clone();
        self.emit(OrchestratorEvent::ProgressUpdated {
            session_id: fetched_for.clone(),
            progress,
        });

        if record.is_terminal() {
            let summary = TerminalSummary::from_session(&record);
            info!(
                session_id = %fetched_for,
                status = %summary.status,
                jobs_found = summary.stats.total_jobs_found,
                jobs_added = summary.stats.total_jobs_added,
                jobs_updated = summary.stats.jobs_updated,
                "crawl session finished"
            );
            state.generation += 1;
            state.view.phase = TrackingPhase::Idle;
            state.view.last_summary = Some(summary.clone());
            self.emit(OrchestratorEvent::SessionFinished(summary));
        }

        state.view.session = Some(record);
        self.publish(&state);
    }

    /// Drop the outcome of a tick scheduled under an earlier generation.
    fn discard_stale(&self, state: &State, fetched_for: Option<SessionId>) {
        let tracked = state.view.phase.session_id().cloned();
        if let Some(fetched_for) = fetched_for {
            debug!(
                fetched_for = %fetched_for,
                tracked = tracked.as_ref().map(|id| id.as_str()),
                "discarding stale crawl progress"
            );
            self.emit(OrchestratorEvent::StaleTickDiscarded {
                fetched_for,
                tracked,
            });
        }
        self.publish(state);
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &State) {
        self.snapshot.send_replace(state.view.clone());
    }

    fn emit(&self, event: OrchestratorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Sleep for `delay`, or park until woken/cancelled when there is none.
async fn sleep_or_park(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending::<()>().await,
    }
}

/// Drop repeated buckets, keeping first-seen order.
fn dedupe(buckets: Vec<BucketId>) -> Vec<BucketId> {
    let mut seen = std::collections::HashSet::new();
    buckets
        .into_iter()
        .filter(|b| seen.insert(b.clone()))
        .collect()
}
