//! Scrape REST API boundary.
//!
//! The crawler and its session store live behind three endpoints:
//!
//! - `POST /scrape/run` starts a session
//! - `GET /scrape/logs` lists every session record
//! - `GET /verify-data` returns an advisory data summary

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ApiError, Result};
use crate::types::{CrawlSession, LogsPayload, RunRequest, RunResponse, VerifyDataReport};

/// Transport timeout applied to every request of [`HttpScrapeClient`].
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait ScrapeApi: Send + Sync {
    /// Start a crawl session. Non-2xx answers come back as [`ApiError::Api`].
    async fn run(&self, request: &RunRequest) -> Result<RunResponse>;

    /// Every session record the backend knows about.
    async fn logs(&self) -> Result<Vec<CrawlSession>>;

    async fn verify_data(&self) -> Result<VerifyDataReport>;
}

/// HTTP implementation of [`ScrapeApi`].
#[derive(Clone)]
pub struct HttpScrapeClient {
    http_client: Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl HttpScrapeClient {
    /// Create a client for the API rooted at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http_client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Create from `SCRAPE_API_URL` and optional `SCRAPE_API_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("SCRAPE_API_URL")
            .map_err(|_| ApiError::Config("SCRAPE_API_URL not set".into()))?;
        let client = Self::new(base_url)?;
        if let Ok(token) = std::env::var("SCRAPE_API_TOKEN") {
            client.set_token(Some(token));
        }
        Ok(client)
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.set_token(Some(token.into()));
        self
    }

    /// Replace the bearer token (login/logout). `None` sends requests
    /// unauthenticated.
    pub fn set_token(&self, token: Option<String>) {
        let token = token.filter(|t| !t.is_empty());
        match self.token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn current_token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.current_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ApiError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.authorize(self.http_client.get(&url)).send().await?;
        Self::read_json(resp).await
    }
}

#[async_trait]
impl ScrapeApi for HttpScrapeClient {
    async fn run(&self, request: &RunRequest) -> Result<RunResponse> {
        let url = format!("{}/scrape/run", self.base_url);
        debug!(buckets = request.buckets.len(), "POST /scrape/run");
        let resp = self
            .authorize(self.http_client.post(&url))
            .json(request)
            .send()
            .await?;
        Self::read_json(resp).await
    }

    async fn logs(&self) -> Result<Vec<CrawlSession>> {
        let payload: LogsPayload = self.get("/scrape/logs").await?;
        Ok(payload.into_sessions())
    }

    async fn verify_data(&self) -> Result<VerifyDataReport> {
        self.get("/verify-data").await
    }
}
