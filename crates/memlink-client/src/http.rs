//! HTTP API transport using `reqwest`.
//!
//! JSON in, JSON out. Credentials go in `Authorization: Bearer` and
//! `X-NMEM-API-Key`, both only when a key is configured. Every request carries
//! its own timeout; a timed-out request is dropped, which releases the
//! connection.

use std::time::Duration;

use reqwest::{Method, Url};
use serde_json::{Value, json};
use tracing::debug;

use memlink_core::json::{pick, scalar_string};
use memlink_settings::{ApiKey, ResolvedConfig};

use crate::errors::{ClientError, Result};
use crate::types::{
    AppendResult, AppendThread, CreateThread, DistillResult, FeedEvent, FeedQuery,
    GraphNeighborhood, HealthStatus, Memory, NewMemory, SearchResult, ThreadPage, ThreadQuery,
    ThreadSearch, TriageVerdict, WorkingMemory, parse_created_id, parse_feed_events,
    parse_search_results,
};

/// Header carrying the API key alongside the bearer token.
pub const API_KEY_HEADER: &str = "X-NMEM-API-Key";

/// Time bounds for HTTP calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// Writes, searches, triage, distill.
    pub default: Duration,
    /// Cheap reads (`/health`).
    pub light: Duration,
    /// Working memory and feed reads.
    pub read: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(30),
            light: Duration::from_secs(5),
            read: Duration::from_secs(15),
        }
    }
}

/// HTTP transport backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<ApiKey>,
    timeouts: HttpTimeouts,
}

impl HttpTransport {
    /// Build a transport from resolved config.
    pub fn new(config: &ResolvedConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("memlink/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
            base_url: config.effective_api_url().to_string(),
            api_key: config.api_key.clone(),
            timeouts: HttpTimeouts::default(),
        }
    }

    /// Override the default time bounds.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: HttpTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::Validation(format!("invalid apiUrl {}: {e}", self.base_url)))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| ClientError::Validation(format!("apiUrl cannot be a base: {}", self.base_url)))?;
            let _ = path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                let _ = pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// Send one request and decode the JSON body (empty body → `null`).
    pub async fn request(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let url = self.url(segments, query)?;
        let operation = format!("{method} /{}", segments.first().copied().unwrap_or_default());
        debug!(%method, path = url.path(), "api request");

        let mut req = self.client.request(method, url).timeout(timeout);
        if let Some(key) = &self.api_key {
            req = req
                .bearer_auth(key.expose())
                .header(API_KEY_HEADER, key.expose());
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout {
                    operation: operation.clone(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }
            } else {
                ClientError::Network(e.without_url().to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Network(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
                message: error_message(&text)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string()),
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ClientError::InvalidJson(e.to_string()))
    }

    // ── Operations ──────────────────────────────────────────────────

    /// `POST /memories/search`
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let body = json!({"query": query, "limit": limit, "mode": "fast"});
        let data = self
            .request(Method::POST, &["memories", "search"], &[], Some(&body), self.timeouts.default)
            .await?;
        Ok(parse_search_results(&data))
    }

    /// `POST /memories`
    pub async fn add_memory(&self, memory: &NewMemory) -> Result<String> {
        let body = serde_json::to_value(memory).map_err(|e| ClientError::Validation(e.to_string()))?;
        let data = self
            .request(Method::POST, &["memories"], &[], Some(&body), self.timeouts.default)
            .await?;
        Ok(parse_created_id(&data))
    }

    /// `DELETE /memories/{id}`
    pub async fn delete_memory(&self, id: &str) -> Result<()> {
        let _ = self
            .request(Method::DELETE, &["memories", id], &[], None, self.timeouts.default)
            .await?;
        Ok(())
    }

    /// `GET /memories/{id}`
    pub async fn get_memory(&self, id: &str) -> Result<Memory> {
        let data = self
            .request(Method::GET, &["memories", id], &[], None, self.timeouts.read)
            .await?;
        Ok(Memory::from_value(&data))
    }

    /// `POST /threads`
    pub async fn create_thread(&self, req: &CreateThread) -> Result<AppendResult> {
        let body = serde_json::to_value(req).map_err(|e| ClientError::Validation(e.to_string()))?;
        let data = self
            .request(Method::POST, &["threads"], &[], Some(&body), self.timeouts.default)
            .await?;
        let mut result = AppendResult::from_value(&data);
        if result.messages_added == 0 {
            result.messages_added = req.messages.len();
        }
        Ok(result)
    }

    /// `POST /threads/{id}/append`
    pub async fn append_thread(&self, req: &AppendThread) -> Result<AppendResult> {
        let body = json!({
            "messages": req.messages,
            "idempotency_key": req.idempotency_key,
        });
        let data = self
            .request(
                Method::POST,
                &["threads", &req.thread_id, "append"],
                &[],
                Some(&body),
                self.timeouts.default,
            )
            .await?;
        Ok(AppendResult::from_value(&data))
    }

    /// `GET /agent/working-memory`
    pub async fn read_working_memory(&self) -> Result<WorkingMemory> {
        let data = self
            .request(Method::GET, &["agent", "working-memory"], &[], None, self.timeouts.read)
            .await?;
        Ok(WorkingMemory::from_value(&data))
    }

    /// `PUT /agent/working-memory`
    pub async fn write_working_memory(&self, content: &str) -> Result<()> {
        let body = json!({"content": content});
        let _ = self
            .request(Method::PUT, &["agent", "working-memory"], &[], Some(&body), self.timeouts.default)
            .await?;
        Ok(())
    }

    /// `GET /threads/search`
    pub async fn search_threads(&self, query: &ThreadQuery) -> Result<ThreadSearch> {
        let mut params = vec![("query", query.query.clone()), ("limit", query.limit.to_string())];
        if let Some(source) = &query.source {
            params.push(("source", source.clone()));
        }
        let data = self
            .request(Method::GET, &["threads", "search"], &params, None, self.timeouts.read)
            .await?;
        Ok(ThreadSearch::from_value(&data))
    }

    /// `GET /threads/{id}`
    pub async fn fetch_thread(&self, thread_id: &str, offset: usize, limit: usize) -> Result<ThreadPage> {
        let params = [("offset", offset.to_string()), ("limit", limit.to_string())];
        let data = self
            .request(Method::GET, &["threads", thread_id], &params, None, self.timeouts.read)
            .await?;
        Ok(ThreadPage::from_value(&data))
    }

    /// `POST /memories/distill/triage`
    pub async fn triage_conversation(&self, content: &str) -> Result<TriageVerdict> {
        let body = json!({"thread_content": content});
        let data = self
            .request(
                Method::POST,
                &["memories", "distill", "triage"],
                &[],
                Some(&body),
                self.timeouts.default,
            )
            .await?;
        Ok(TriageVerdict::from_value(&data))
    }

    /// `POST /memories/distill`
    pub async fn distill_thread(&self, thread_id: &str, content: &str) -> Result<DistillResult> {
        let body = json!({"thread_id": thread_id, "thread_content": content});
        let data = self
            .request(Method::POST, &["memories", "distill"], &[], Some(&body), self.timeouts.default)
            .await?;
        Ok(DistillResult::from_value(&data))
    }

    /// `GET /agent/feed/events`
    pub async fn feed_events(&self, query: &FeedQuery) -> Result<Vec<FeedEvent>> {
        let mut params = vec![
            ("last_n_days", query.last_n_days.to_string()),
            ("limit", query.limit.to_string()),
            ("tier1_only", query.tier1_only.to_string()),
        ];
        if let Some(kind) = &query.event_type {
            params.push(("event_type", kind.clone()));
        }
        let data = self
            .request(Method::GET, &["agent", "feed", "events"], &params, None, self.timeouts.read)
            .await?;
        Ok(parse_feed_events(&data))
    }

    /// `GET /graph/expand/{id}`
    pub async fn graph_expand(&self, memory_id: &str, depth: u32) -> Result<GraphNeighborhood> {
        let params = [("depth", depth.to_string()), ("limit", "15".to_string())];
        let data = self
            .request(Method::GET, &["graph", "expand", memory_id], &params, None, self.timeouts.read)
            .await?;
        Ok(GraphNeighborhood::from_value(&data))
    }

    /// `GET /health`
    pub async fn health(&self) -> Result<HealthStatus> {
        let data = self
            .request(Method::GET, &["health"], &[], None, self.timeouts.light)
            .await?;
        Ok(HealthStatus::from_value(&data))
    }
}

/// Error text from a JSON body's `detail` or `message`, or the raw body.
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(v) => pick(&v, &["detail", "message", "error"]).map(|d| {
            scalar_string(d).unwrap_or_else(|| d.to_string())
        }),
        Err(_) => Some(trimmed.to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
