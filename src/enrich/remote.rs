//! Remote gene-set enrichment over HTTP.
//!
//! Talks to a g:Profiler-style `profile` endpoint. All wire types are
//! private to this module — callers only ever see [`RemoteEnrichment`]. The
//! enricher never surfaces transport problems as errors: timeouts, HTTP
//! failures and undecodable bodies all collapse into
//! [`RemoteEnrichment::Unavailable`] with the reason logged and carried
//! along, so a flaky service degrades the output instead of failing the run.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};

use crate::annotation::EntityId;
use crate::config::RemoteConfig;
use crate::error::CoreError;

use super::{sort_results, EnrichmentResult};

// ── Public enricher ───────────────────────────────────────────────────────────

/// Outcome of a remote enrichment attempt.
///
/// `Unavailable` is a sentinel, not an error: callers keep their locally
/// computed results and skip the remote section of the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum RemoteEnrichment {
    Ready(Vec<EnrichmentResult>),
    Unavailable { reason: String },
}

impl RemoteEnrichment {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RemoteEnrichment::Unavailable { .. })
    }
}

/// Rate-limited client for an external enrichment service.
///
/// Each instance owns its own last-call timestamp, so the minimum spacing
/// holds across every task sharing the instance.
pub struct RemoteEnricher {
    client: Client,
    api_base_url: String,
    organism: String,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RemoteEnricher {
    pub fn new(config: &RemoteConfig) -> Result<Self, CoreError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CoreError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base_url: config.api_base_url.clone(),
            organism: config.organism.clone(),
            min_interval: config.min_interval,
            last_call: Mutex::new(None),
        })
    }

    /// Submit `symbols` against one term `collection` (e.g. `"GO:BP"`).
    ///
    /// Waits out the rate limit first, then gives the service at most
    /// `timeout` for the whole round trip. An empty symbol list
    /// short-circuits without touching the network.
    pub async fn enrich(
        &self,
        symbols: &[String],
        collection: &str,
        timeout: Duration,
    ) -> RemoteEnrichment {
        if symbols.is_empty() {
            return RemoteEnrichment::Unavailable {
                reason: "no symbols to submit".into(),
            };
        }
        self.pace().await;
        match self.profile(symbols, collection, timeout).await {
            Ok(results) => {
                debug!(terms = results.len(), collection, "remote enrichment ready");
                RemoteEnrichment::Ready(results)
            }
            Err(e) => {
                warn!(error = %e, collection, "remote enrichment unavailable");
                RemoteEnrichment::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Enforce the minimum spacing between outbound calls.
    ///
    /// Concurrent callers serialize on the timestamp lock through the wait;
    /// the lock is released before the HTTP round trip starts.
    async fn pace(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let since = previous.elapsed();
            if since < self.min_interval {
                sleep(self.min_interval - since).await;
            }
        }
        *last_call = Some(Instant::now());
    }

    async fn profile(
        &self,
        symbols: &[String],
        collection: &str,
        timeout: Duration,
    ) -> Result<Vec<EnrichmentResult>, RemoteError> {
        let payload = ProfileRequest {
            organism: &self.organism,
            query: symbols,
            sources: vec![collection],
        };
        debug!(
            url = %self.api_base_url,
            symbols = symbols.len(),
            collection,
            timeout_ms = timeout.as_millis() as u64,
            "sending remote enrichment request"
        );
        let response = self
            .client
            .post(&self.api_base_url)
            .timeout(timeout)
            .json(&payload)
            .send()
            .await
            .map_err(classify_transport)?;
        let response = check_status(response).await?;
        let parsed = response
            .json::<ProfileResponse>()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RemoteError::Timeout
                } else {
                    RemoteError::Decode(e)
                }
            })?;
        let mut results: Vec<EnrichmentResult> = parsed
            .result
            .into_iter()
            .map(ProfileRow::into_result)
            .collect();
        sort_results(&mut results);
        Ok(results)
    }
}

#[derive(Debug, thiserror::Error)]
enum RemoteError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to parse response body: {0}")]
    Decode(reqwest::Error),
}

fn classify_transport(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Transport(e)
    }
}

/// Consume the response and return it if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());
    // Error bodies can be arbitrarily large; keep the reason loggable.
    let body: String = body.chars().take(200).collect();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ProfileRequest<'a> {
    organism: &'a str,
    query: &'a [String],
    sources: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    result: Vec<ProfileRow>,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    native: String,
    #[serde(default)]
    name: Option<String>,
    p_value: f64,
    #[serde(default)]
    term_size: u64,
    #[serde(default)]
    query_size: u64,
    #[serde(default)]
    intersection_size: u64,
    #[serde(default)]
    effective_domain_size: u64,
    #[serde(default)]
    intersections: Vec<String>,
}

impl ProfileRow {
    fn into_result(self) -> EnrichmentResult {
        EnrichmentResult {
            term_id: self.native.into(),
            term_name: self.name,
            // The service reports multiple-testing-corrected values only,
            // so both fields carry the corrected value.
            p_value: self.p_value,
            fdr: self.p_value,
            overlap_count: self.intersection_size,
            candidate_set_size: self.query_size,
            background_count: self.term_size,
            universe_size: self.effective_domain_size,
            matched_entities: self
                .intersections
                .into_iter()
                .map(EntityId::from)
                .collect(),
        }
    }
}
