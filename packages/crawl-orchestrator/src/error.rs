//! Typed errors for the crawl orchestrator.

use std::time::Duration;

use thiserror::Error;

/// Result type for scrape API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors talking to the scrape REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection failed, request timed out at the transport, etc.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx response
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Missing or invalid client settings
    #[error("configuration error: {0}")]
    Config(String),
}

/// Why a `start()` call did not produce a tracked session.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// No buckets were selected. Rejected before any request is made.
    #[error("select at least one bucket to start a crawl")]
    EmptySelection,

    /// Another session is being launched or tracked by this orchestrator.
    #[error("a crawl session is already active")]
    SessionAlreadyActive,

    /// The backend answered but refused to start the session.
    #[error("crawl launch rejected ({status}): {message}")]
    LaunchRejected { status: u16, message: String },

    /// The launch request never produced a backend answer.
    #[error("crawl launch failed: {0}")]
    Api(#[from] ApiError),
}

/// A failed logs fetch. Returned by `list_history`; inside the poller it is
/// logged and retried on the next tick.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("failed to fetch crawl logs: {0}")]
    Fetch(#[from] ApiError),

    #[error("crawl log fetch timed out after {0:?}")]
    TimedOut(Duration),
}
