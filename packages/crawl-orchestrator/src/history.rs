use chrono::{DateTime, Utc};

use crate::types::{CrawlSession, SessionId};

/// Last fetched session collection, kept in backend order.
///
/// Refreshed by every successful poll and by on-demand listing; never
/// consulted by the tracking logic itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionHistory {
    sessions: Vec<CrawlSession>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn replace(&mut self, sessions: Vec<CrawlSession>) {
        self.sessions = sessions;
        self.refreshed_at = Some(Utc::now());
    }

    pub fn sessions(&self) -> &[CrawlSession] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// When the collection was last fetched, `None` before the first fetch.
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    pub fn find(&self, id: &SessionId) -> Option<&CrawlSession> {
        self.sessions.iter().find(|s| &s.session_id == id)
    }

    /// Most recently started session. Does not rely on backend ordering.
    pub fn latest(&self) -> Option<&CrawlSession> {
        self.sessions
            .iter()
            .max_by_key(|s| s.started_at.unwrap_or(DateTime::<Utc>::MIN_UTC))
    }

    pub fn in_progress(&self) -> impl Iterator<Item = &CrawlSession> {
        self.sessions.iter().filter(|s| !s.is_terminal())
    }

    pub fn terminal(&self) -> impl Iterator<Item = &CrawlSession> {
        self.sessions.iter().filter(|s| s.is_terminal())
    }
}
