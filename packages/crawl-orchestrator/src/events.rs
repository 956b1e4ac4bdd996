use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::{AggregateStats, SessionProgress};
use crate::buckets::BucketId;
use crate::types::{CrawlSession, SessionId, SessionStatus};

/// Outcome of a session that reached a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSummary {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub stats: AggregateStats,
    pub completed: Vec<BucketId>,
    pub failed: Vec<BucketId>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
}

impl TerminalSummary {
    pub fn from_session(session: &CrawlSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
            status: session.status,
            stats: AggregateStats::from_session(session),
            completed: session.buckets_completed.clone(),
            failed: session.buckets_failed.clone(),
            completed_at: session.completed_at,
            duration_ms: session.duration_ms,
            error_message: session.error_message.clone(),
        }
    }
}

/// Facts published by the orchestrator, in the order they happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    // ============================================================================
    // Session lifecycle
    // ============================================================================
    SessionLaunched {
        session_id: SessionId,
        buckets: Vec<BucketId>,
    },

    ProgressUpdated {
        session_id: SessionId,
        progress: SessionProgress,
    },

    SessionFinished(TerminalSummary),

    /// Tracking abandoned before the session reached a terminal status.
    TrackingStopped {
        session_id: SessionId,
    },

    // ============================================================================
    // Polling
    // ============================================================================
    HistoryRefreshed {
        sessions: usize,
    },

    /// A tick failed; polling continues on the next tick.
    PollFetchFailed {
        session_id: Option<SessionId>,
        error: String,
    },

    /// A fetch for a session that is no longer tracked settled late and was
    /// dropped without touching tracking state.
    StaleTickDiscarded {
        fetched_for: SessionId,
        tracked: Option<SessionId>,
    },
}
