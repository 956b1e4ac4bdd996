use std::time::Duration;

/// Configuration for [`CrawlOrchestrator`](crate::CrawlOrchestrator).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Delay between fetches while a session is tracked
    pub poll_interval: Duration,
    /// Delay between history refreshes while idle; `None` disables them
    pub passive_refresh: Option<Duration>,
    /// Upper bound on one logs fetch
    pub request_timeout: Duration,
    /// `triggeredBy` sent with launch requests
    pub triggered_by: String,
    /// Buffered events per subscriber before lagging ones drop
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            passive_refresh: Some(Duration::from_millis(15000)),
            request_timeout: Duration::from_secs(10),
            triggered_by: "manual".to_string(),
            event_capacity: 256,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_passive_refresh(mut self, interval: Option<Duration>) -> Self {
        self.passive_refresh = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_triggered_by(mut self, triggered_by: impl Into<String>) -> Self {
        self.triggered_by = triggered_by.into();
        self
    }

    /// Delay before the next tick given whether a session is tracked.
    pub(crate) fn next_delay(&self, tracking: bool) -> Option<Duration> {
        if tracking {
            Some(self.poll_interval)
        } else {
            self.passive_refresh
        }
    }
}
