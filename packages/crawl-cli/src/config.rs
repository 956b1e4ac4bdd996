use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use crawl_orchestrator::OrchestratorConfig;
use dotenvy::dotenv;

/// CLI configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub api_token: Option<String>,
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = OrchestratorConfig::default();

        let poll_interval = millis_var("CRAWL_POLL_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);
        let passive_refresh = match millis_var("CRAWL_PASSIVE_REFRESH_MS")? {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => defaults.passive_refresh,
        };
        let request_timeout = millis_var("CRAWL_REQUEST_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.request_timeout);
        let triggered_by = env::var("CRAWL_TRIGGERED_BY").unwrap_or(defaults.triggered_by.clone());

        Ok(Self {
            api_url: env::var("SCRAPE_API_URL").context("SCRAPE_API_URL must be set")?,
            api_token: env::var("SCRAPE_API_TOKEN").ok().filter(|t| !t.is_empty()),
            orchestrator: defaults
                .with_poll_interval(poll_interval)
                .with_passive_refresh(passive_refresh)
                .with_request_timeout(request_timeout)
                .with_triggered_by(triggered_by),
        })
    }
}

fn millis_var(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .with_context(|| format!("{} must be a number of milliseconds", name)),
        Err(_) => Ok(None),
    }
}
