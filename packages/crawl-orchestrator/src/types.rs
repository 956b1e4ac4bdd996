use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::buckets::BucketId;

/// Backend-assigned identifier of a crawl session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Lifecycle state of a crawl session as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Failed,
    /// Finished with at least one failed bucket.
    Partial,
    /// A status string this client does not recognise.
    #[serde(other)]
    Unknown,
}

impl SessionStatus {
    /// Whether the backend will no longer mutate a session in this state.
    ///
    /// `Partial` is terminal: the backend only reports it once every bucket
    /// has resolved.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Partial
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in-progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Partial => "partial",
            SessionStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One invocation of the external crawler, as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlSession {
    pub session_id: SessionId,
    pub status: SessionStatus,
    #[serde(default)]
    pub buckets_requested: Vec<BucketId>,
    #[serde(default)]
    pub buckets_completed: Vec<BucketId>,
    #[serde(default)]
    pub buckets_failed: Vec<BucketId>,
    #[serde(default)]
    pub total_api_calls: u64,
    #[serde(default)]
    pub total_jobs_found: u64,
    #[serde(default)]
    pub new_jobs_added: u64,
    #[serde(default)]
    pub jobs_updated: u64,
    #[serde(default)]
    pub indian_jobs_found: u64,
    #[serde(default)]
    pub indian_jobs_added: u64,
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// A broken bucket-set invariant on a session record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAnomaly {
    /// Bucket listed as both completed and failed.
    CompletedAndFailed(BucketId),
    /// Bucket resolved without having been requested.
    ResolvedButNotRequested(BucketId),
}

impl CrawlSession {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check the bucket-set invariants. The backend owns these sets, so
    /// violations are reported rather than corrected.
    pub fn anomalies(&self) -> Vec<SessionAnomaly> {
        let completed: BTreeSet<&BucketId> = self.buckets_completed.iter().collect();
        let failed: BTreeSet<&BucketId> = self.buckets_failed.iter().collect();
        let requested: BTreeSet<&BucketId> = self.buckets_requested.iter().collect();

        let mut anomalies: Vec<SessionAnomaly> = completed
            .intersection(&failed)
            .map(|b| SessionAnomaly::CompletedAndFailed((*b).clone()))
            .collect();

        anomalies.extend(
            completed
                .union(&failed)
                .filter(|b| !requested.contains(*b))
                .map(|b| SessionAnomaly::ResolvedButNotRequested((*b).clone())),
        );

        anomalies
    }
}

/// Filters forwarded to the crawler with a launch request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchFilters {
    /// Country scope, e.g. `"India"`.
    pub country: Option<String>,
    pub location: Option<String>,
    /// Keep only jobs located in India.
    pub filter_indian_jobs: bool,
    pub include_remote: Option<bool>,
}

impl LaunchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn indian_jobs_only(mut self) -> Self {
        self.filter_indian_jobs = true;
        self
    }

    pub fn with_remote(mut self, include_remote: bool) -> Self {
        self.include_remote = Some(include_remote);
        self
    }
}

/// Body of `POST /scrape/run`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub buckets: Vec<BucketId>,
    pub triggered_by: String,
    pub filter_indian_jobs: bool,
    pub country: Option<String>,
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_remote: Option<bool>,
}

impl RunRequest {
    pub fn new(buckets: Vec<BucketId>, triggered_by: impl Into<String>, filters: LaunchFilters) -> Self {
        Self {
            buckets,
            triggered_by: triggered_by.into(),
            filter_indian_jobs: filters.filter_indian_jobs,
            country: filters.country,
            location: filters.location,
            include_remote: filters.include_remote,
        }
    }
}

/// Successful answer to `POST /scrape/run`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET /scrape/logs` answers either a bare array or `{ "logs": [...] }`.
///
/// Records are decoded one by one so a single malformed record does not hide
/// the rest of the collection.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LogsPayload {
    List(Vec<serde_json::Value>),
    Wrapped { logs: Vec<serde_json::Value> },
}

impl LogsPayload {
    /// Decoded session records. Malformed ones are skipped with a warning.
    pub fn into_sessions(self) -> Vec<CrawlSession> {
        let records = match self {
            LogsPayload::List(records) | LogsPayload::Wrapped { logs: records } => records,
        };
        records
            .into_iter()
            .filter_map(|record| {
                let session_id = record
                    .get("sessionId")
                    .and_then(|id| id.as_str())
                    .map(str::to_owned);
                match serde_json::from_value::<CrawlSession>(record) {
                    Ok(session) => Some(session),
                    Err(e) => {
                        warn!(session_id = ?session_id, error = %e, "skipping malformed crawl session record");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Advisory payload from `GET /verify-data`. Only the commonly used keys are
/// typed; everything else is kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyDataReport {
    #[serde(default)]
    pub total_jobs: Option<u64>,
    #[serde(default)]
    pub indian_jobs: Option<u64>,
    #[serde(default)]
    pub latest_session: Option<CrawlSession>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}
