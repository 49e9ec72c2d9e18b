//! HTTP client collaborator for scenario actions.
//!
//! [`Client`] wraps a shared `reqwest::Client` and feeds the builtin request
//! metrics on every call. Construct it once per run (the harness does this)
//! and clone it into iteration contexts; never build a fresh client inside
//! an action.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::error::HarnessError;
use crate::metric::Tags;
use crate::registry::{BuiltinMetrics, Recorder};

pub use reqwest::Method;

/// Timing breakdown of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Full round trip, including reading the body.
    pub total: Duration,
    /// Time to first byte.
    pub waiting: Duration,
}

/// Result of one HTTP call. Immutable once produced; checks and metric
/// updates only read from it.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: String,
    pub headers: BTreeMap<String, String>,
    pub timings: Timings,
    pub tags: Tags,
}

/// Recoverable per-request failure. Recorded into `http_req_failed` and
/// reported through checks; it never unwinds the harness.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request timed out")]
    Timeout(#[source] reqwest::Error),
    #[error("connection failed")]
    Connect(#[source] reqwest::Error),
    #[error("request failed")]
    Other(#[source] reqwest::Error),
}

fn classify(err: reqwest::Error) -> RequestError {
    if err.is_timeout() {
        RequestError::Timeout(err)
    } else if err.is_connect() {
        RequestError::Connect(err)
    } else {
        RequestError::Other(err)
    }
}

/// k6 default response callback: anything outside 2xx/3xx is a failed
/// request, even when a check expects that status.
pub(crate) fn is_failed_status(status: u16) -> bool {
    !(200..400).contains(&status)
}

/// HTTP collaborator handed to every iteration through
/// [`crate::VuContext`].
#[derive(Debug, Clone)]
pub struct Client {
    inner: reqwest::Client,
    recorder: Recorder,
    builtins: BuiltinMetrics,
}

impl Client {
    pub(crate) fn new(
        recorder: Recorder,
        builtins: BuiltinMetrics,
        timeout: Duration,
    ) -> Result<Self, HarnessError> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HarnessError::InvalidConfiguration(format!("http client: {e}")))?;
        Ok(Self {
            inner,
            recorder,
            builtins,
        })
    }

    pub async fn get(&self, url: &str) -> Result<Response, RequestError> {
        self.request(Method::GET, url, Tags::new()).await
    }

    pub async fn get_tagged(&self, url: &str, tags: Tags) -> Result<Response, RequestError> {
        self.request(Method::GET, url, tags).await
    }

    /// Issue one request. Every call records `http_reqs`; a completed
    /// exchange also records `http_req_duration`, `http_req_waiting`, and
    /// `http_req_failed`; a transport error records only the failure.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        tags: Tags,
    ) -> Result<Response, RequestError> {
        self.recorder
            .record_with(self.builtins.http_reqs, 1.0, tags.clone());
        let started = Instant::now();
        match self.exchange(method, url, started).await {
            Ok((status, headers, body, timings)) => {
                let failed = is_failed_status(status);
                self.recorder.record_with(
                    self.builtins.http_req_failed,
                    if failed { 1.0 } else { 0.0 },
                    tags.clone(),
                );
                self.recorder.record_with(
                    self.builtins.http_req_duration,
                    millis(timings.total),
                    tags.clone(),
                );
                self.recorder.record_with(
                    self.builtins.http_req_waiting,
                    millis(timings.waiting),
                    tags.clone(),
                );
                Ok(Response {
                    status,
                    body,
                    headers,
                    timings,
                    tags,
                })
            }
            Err(err) => {
                self.recorder
                    .record_with(self.builtins.http_req_failed, 1.0, tags);
                tracing::debug!(url, error = %err, "request failed");
                Err(err)
            }
        }
    }

    async fn exchange(
        &self,
        method: Method,
        url: &str,
        started: Instant,
    ) -> Result<(u16, BTreeMap<String, String>, String, Timings), RequestError> {
        let response = self
            .inner
            .request(method, url)
            .send()
            .await
            .map_err(classify)?;
        let waiting = started.elapsed();
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(key, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (key.to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(classify)?;
        let total = started.elapsed();
        Ok((status, headers, body, Timings { total, waiting }))
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
