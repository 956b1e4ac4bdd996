//! Per-bucket progress derived from a coarse session record.
//!
//! The backend only reports which buckets were requested, completed and
//! failed, so per-bucket progress is a coarse three-step value rather than a
//! measured fraction. Everything here is a pure function of its inputs.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::buckets::BucketId;
use crate::types::CrawlSession;

/// Progress reported for a requested bucket the backend has not resolved.
pub const IN_PROGRESS_PERCENT: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BucketStatus {
    /// Not part of the session's requested buckets.
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl BucketStatus {
    /// Coarse completion percentage for this status. Failed buckets
    /// contributed nothing, so they report 0.
    pub fn percent(self) -> u8 {
        match self {
            BucketStatus::Completed => 100,
            BucketStatus::InProgress => IN_PROGRESS_PERCENT,
            BucketStatus::Failed | BucketStatus::Pending => 0,
        }
    }

    pub fn is_resolved(self) -> bool {
        matches!(self, BucketStatus::Completed | BucketStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BucketStatus::Pending => "pending",
            BucketStatus::InProgress => "in-progress",
            BucketStatus::Completed => "completed",
            BucketStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketProgress {
    pub bucket: BucketId,
    pub status: BucketStatus,
    pub progress: u8,
}

/// Session-level counters copied from the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_jobs_found: u64,
    pub total_jobs_added: u64,
    pub jobs_updated: u64,
    pub indian_jobs_found: u64,
    pub indian_jobs_added: u64,
    pub total_api_calls: u64,
    pub requested_buckets: usize,
    pub completed_buckets: usize,
    pub failed_buckets: usize,
}

impl AggregateStats {
    pub fn from_session(session: &CrawlSession) -> Self {
        Self {
            total_jobs_found: session.total_jobs_found,
            total_jobs_added: session.new_jobs_added,
            jobs_updated: session.jobs_updated,
            indian_jobs_found: session.indian_jobs_found,
            indian_jobs_added: session.indian_jobs_added,
            total_api_calls: session.total_api_calls,
            requested_buckets: distinct(&session.buckets_requested).len(),
            completed_buckets: distinct(&session.buckets_completed).len(),
            failed_buckets: distinct(&session.buckets_failed).len(),
        }
    }
}

/// Derived view of one session tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub buckets: Vec<BucketProgress>,
    pub stats: AggregateStats,
}

impl SessionProgress {
    /// Mean of the per-bucket percentages, 0 when no buckets are tracked.
    pub fn percent_complete(&self) -> u8 {
        if self.buckets.is_empty() {
            return 0;
        }
        let sum: usize = self.buckets.iter().map(|b| usize::from(b.progress)).sum();
        (sum / self.buckets.len()) as u8
    }

    pub fn count(&self, status: BucketStatus) -> usize {
        self.buckets.iter().filter(|b| b.status == status).count()
    }
}

/// Derive per-bucket progress for `requested_buckets` (in that order) plus the
/// aggregate counters of `session`.
///
/// Buckets the backend resolved but that are missing from
/// `requested_buckets` get no entry, but still count in the aggregate.
pub fn derive(session: &CrawlSession, requested_buckets: &[BucketId]) -> SessionProgress {
    let requested = distinct(&session.buckets_requested);
    let completed = distinct(&session.buckets_completed);
    let failed = distinct(&session.buckets_failed);

    let buckets = requested_buckets
        .iter()
        .map(|bucket| {
            let status = if completed.contains(bucket) {
                BucketStatus::Completed
            } else if failed.contains(bucket) {
                BucketStatus::Failed
            } else if requested.contains(bucket) {
                BucketStatus::InProgress
            } else {
                BucketStatus::Pending
            };
            BucketProgress {
                bucket: bucket.clone(),
                status,
                progress: status.percent(),
            }
        })
        .collect();

    SessionProgress {
        buckets,
        stats: AggregateStats::from_session(session),
    }
}

fn distinct(buckets: &[BucketId]) -> HashSet<&BucketId> {
    buckets.iter().collect()
}
