//! Testing utilities including a mock scrape API.
//!
//! Useful for exercising the orchestrator without a backend: responses are
//! scripted up front and every call is recorded for assertions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use crate::buckets::BucketId;
use crate::client::ScrapeApi;
use crate::error::{ApiError, Result};
use crate::types::{
    CrawlSession, RunRequest, RunResponse, SessionId, SessionStatus, VerifyDataReport,
};

/// Record of a call made to the mock API.
#[derive(Debug, Clone)]
pub enum MockCall {
    Run(RunRequest),
    Logs,
    VerifyData,
}

/// Scripted answer to one `logs()` call.
#[derive(Debug, Clone)]
pub enum LogsReply {
    Sessions(Vec<CrawlSession>),
    /// Non-2xx answer
    Error { status: u16, message: String },
    /// Never answers; exercises the poll timeout
    Hang,
    /// Answers once the gate is notified
    Gated {
        gate: Arc<Notify>,
        sessions: Vec<CrawlSession>,
    },
}

/// Scripted answer to one `run()` call.
#[derive(Debug, Clone)]
pub enum RunReply {
    Started(SessionId),
    Error { status: u16, message: String },
    /// Starts the session once the gate is notified
    Gated {
        gate: Arc<Notify>,
        session_id: SessionId,
    },
}

/// A mock [`ScrapeApi`] with scripted responses.
///
/// Once the scripted `logs()` replies run out, the last successful session
/// list is returned again, like a backend whose records stopped changing.
#[derive(Default)]
pub struct MockScrapeApi {
    run_replies: Mutex<VecDeque<RunReply>>,
    logs_replies: Mutex<VecDeque<LogsReply>>,
    last_sessions: Mutex<Vec<CrawlSession>>,
    verify_report: Mutex<VerifyDataReport>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockScrapeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next `run()` with a started session.
    pub fn with_run(self, session_id: impl Into<String>) -> Self {
        self.push_run(RunReply::Started(SessionId::new(session_id)));
        self
    }

    /// Answer the next `run()` with a backend rejection.
    pub fn with_run_error(self, status: u16, message: impl Into<String>) -> Self {
        self.push_run(RunReply::Error {
            status,
            message: message.into(),
        });
        self
    }

    /// Answer the next `run()` with a started session, but only once `gate`
    /// is notified.
    pub fn with_gated_run(self, gate: Arc<Notify>, session_id: impl Into<String>) -> Self {
        self.push_run(RunReply::Gated {
            gate,
            session_id: SessionId::new(session_id),
        });
        self
    }

    pub fn with_logs(self, sessions: Vec<CrawlSession>) -> Self {
        self.push_logs(LogsReply::Sessions(sessions));
        self
    }

    pub fn with_logs_reply(self, reply: LogsReply) -> Self {
        self.push_logs(reply);
        self
    }

    pub fn with_verify_report(self, report: VerifyDataReport) -> Self {
        *self.verify_report.lock().unwrap() = report;
        self
    }

    pub fn push_run(&self, reply: RunReply) {
        self.run_replies.lock().unwrap().push_back(reply);
    }

    pub fn push_logs(&self, reply: LogsReply) {
        self.logs_replies.lock().unwrap().push_back(reply);
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn run_calls(&self) -> Vec<RunRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::Run(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn logs_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Logs))
            .count()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ScrapeApi for MockScrapeApi {
    async fn run(&self, request: &RunRequest) -> Result<RunResponse> {
        self.record(MockCall::Run(request.clone()));
        let reply = self.run_replies.lock().unwrap().pop_front();
        let started = |id: SessionId| RunResponse {
            session_id: Some(id),
            success: Some(true),
            message: None,
        };
        match reply {
            Some(RunReply::Started(id)) => Ok(started(id)),
            Some(RunReply::Error { status, message }) => Err(ApiError::Api { status, message }),
            Some(RunReply::Gated { gate, session_id }) => {
                gate.notified().await;
                Ok(started(session_id))
            }
            None => Err(ApiError::Api {
                status: 500,
                message: "no scripted run reply".to_string(),
            }),
        }
    }

    async fn logs(&self) -> Result<Vec<CrawlSession>> {
        self.record(MockCall::Logs);
        let reply = self.logs_replies.lock().unwrap().pop_front();
        let sessions = match reply {
            None => return Ok(self.last_sessions.lock().unwrap().clone()),
            Some(LogsReply::Sessions(sessions)) => sessions,
            Some(LogsReply::Error { status, message }) => {
                return Err(ApiError::Api { status, message })
            }
            Some(LogsReply::Hang) => return std::future::pending().await,
            Some(LogsReply::Gated { gate, sessions }) => {
                gate.notified().await;
                sessions
            }
        };
        *self.last_sessions.lock().unwrap() = sessions.clone();
        Ok(sessions)
    }

    async fn verify_data(&self) -> Result<VerifyDataReport> {
        self.record(MockCall::VerifyData);
        Ok(self.verify_report.lock().unwrap().clone())
    }
}

/// Builder for session records used in tests.
#[derive(Debug, Clone)]
pub struct SessionFixture {
    session: CrawlSession,
}

impl SessionFixture {
    pub fn new(id: impl Into<String>, status: SessionStatus) -> Self {
        Self {
            session: CrawlSession {
                session_id: SessionId::new(id),
                status,
                buckets_requested: Vec::new(),
                buckets_completed: Vec::new(),
                buckets_failed: Vec::new(),
                total_api_calls: 0,
                total_jobs_found: 0,
                new_jobs_added: 0,
                jobs_updated: 0,
                indian_jobs_found: 0,
                indian_jobs_added: 0,
                started_at: Some(Utc::now()),
                completed_at: status.is_terminal().then(Utc::now),
                duration_ms: status.is_terminal().then_some(0),
                triggered_by: Some("manual".to_string()),
                error_message: None,
            },
        }
    }

    pub fn requested(mut self, buckets: &[&str]) -> Self {
        self.session.buckets_requested = to_ids(buckets);
        self
    }

    pub fn completed(mut self, buckets: &[&str]) -> Self {
        self.session.buckets_completed = to_ids(buckets);
        self
    }

    pub fn failed(mut self, buckets: &[&str]) -> Self {
        self.session.buckets_failed = to_ids(buckets);
        self
    }

    /// Set jobs found / added / updated.
    pub fn jobs(mut self, found: u64, added: u64, updated: u64) -> Self {
        self.session.total_jobs_found = found;
        self.session.new_jobs_added = added;
        self.session.jobs_updated = updated;
        self
    }

    pub fn build(self) -> CrawlSession {
        self.session
    }
}

fn to_ids(buckets: &[&str]) -> Vec<BucketId> {
    buckets.iter().map(|b| BucketId::from(*b)).collect()
}
