//! Memory client with CLI-first, API-fallback dispatch.
//!
//! Every operation runs through the CLI. When the CLI answers with an
//! [`ErrorKind::Unsupported`] error (an older `nmem` without the subcommand or
//! flag), the same operation is retried over HTTP. Any other CLI failure is
//! returned as-is.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use memlink_settings::ResolvedConfig;

use crate::cli::CliTransport;
use crate::errors::{ClientError, ErrorKind, Result};
use crate::http::HttpTransport;
use crate::runner::{CommandRunner, TokioCommandRunner};
use crate::types::{
    AppendResult, AppendThread, CreateThread, DistillResult, FeedEvent, FeedQuery,
    GraphNeighborhood, HealthStatus, Memory, NewMemory, SearchResult, ThreadPage, ThreadQuery,
    ThreadSearch, TriageVerdict, WorkingMemory,
};

/// Upper bound on search results per call.
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Upper bound on threads per thread search.
pub const MAX_THREAD_SEARCH_LIMIT: usize = 20;

/// Upper bound on messages per thread page.
pub const MAX_THREAD_PAGE: usize = 200;

/// Operations the rest of memlink needs from the memory service.
///
/// Implemented by [`MemoryClient`]; tests substitute in-memory fakes.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Relevance search.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>>;

    /// Save a memory and return its id.
    async fn add_memory(&self, memory: &NewMemory) -> Result<String>;

    /// Delete a memory by id.
    async fn delete_memory(&self, id: &str) -> Result<()>;

    /// Fetch one memory.
    async fn get_memory(&self, id: &str) -> Result<Memory>;

    /// Create a thread with its initial messages.
    async fn create_thread(&self, req: &CreateThread) -> Result<AppendResult>;

    /// Append to an existing thread. Fails with a not-found kind when the
    /// thread does not exist.
    async fn append_thread(&self, req: &AppendThread) -> Result<AppendResult>;

    /// Read the working-memory briefing.
    async fn read_working_memory(&self) -> Result<WorkingMemory>;

    /// Replace the working-memory briefing.
    async fn write_working_memory(&self, content: &str) -> Result<()>;

    /// Search stored conversations.
    async fn search_threads(&self, query: &ThreadQuery) -> Result<ThreadSearch>;

    /// One page of a stored conversation.
    async fn fetch_thread(&self, thread_id: &str, offset: usize, limit: usize) -> Result<ThreadPage>;

    /// Ask whether a conversation is worth distilling.
    async fn triage_conversation(&self, content: &str) -> Result<TriageVerdict>;

    /// Distill durable memories from a thread.
    async fn distill_thread(&self, thread_id: &str, content: &str) -> Result<DistillResult>;

    /// Recent activity.
    async fn feed_events(&self, query: &FeedQuery) -> Result<Vec<FeedEvent>>;

    /// Graph neighborhood of a memory.
    async fn graph_expand(&self, memory_id: &str, depth: u32) -> Result<GraphNeighborhood>;

    /// Backend reachability and version.
    async fn health(&self) -> Result<HealthStatus>;
}

/// Production client: CLI transport plus HTTP fallback.
pub struct MemoryClient {
    cli: CliTransport,
    http: HttpTransport,
}

fn require_non_empty(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ClientError::Validation(format!("{what} must not be empty")));
    }
    Ok(())
}

impl MemoryClient {
    /// Client using real subprocesses.
    pub fn new(config: &ResolvedConfig) -> Self {
        Self::with_runner(Arc::new(TokioCommandRunner), config)
    }

    /// Client with an injected command runner.
    pub fn with_runner(runner: Arc<dyn CommandRunner>, config: &ResolvedConfig) -> Self {
        Self {
            cli: CliTransport::new(runner, config),
            http: HttpTransport::new(config),
        }
    }

    /// Client from prebuilt transports.
    pub fn from_transports(cli: CliTransport, http: HttpTransport) -> Self {
        Self { cli, http }
    }

    /// The CLI transport.
    pub fn cli(&self) -> &CliTransport {
        &self.cli
    }

    /// The HTTP transport.
    pub fn http(&self) -> &HttpTransport {
        &self.http
    }

    /// Run `cli`; on an unsupported-operation error run `http` instead.
    async fn with_fallback<T, C, H, F>(&self, operation: &str, cli: C, http: H) -> Result<T>
    where
        C: Future<Output = Result<T>> + Send,
        H: FnOnce() -> F + Send,
        F: Future<Output = Result<T>> + Send,
    {
        match cli.await {
            Err(e) if e.kind() == ErrorKind::Unsupported => {
                debug!(operation, error = %e, "cli does not support operation, using api");
                http().await
            }
            other => other,
        }
    }
}

#[async_trait]
impl MemoryBackend for MemoryClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        require_non_empty(query, "query")?;
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);
        self.with_fallback(
            "search",
            self.cli.search(query, limit),
            || self.http.search(query, limit),
        )
        .await
    }

    async fn add_memory(&self, memory: &NewMemory) -> Result<String> {
        require_non_empty(&memory.content, "content")?;
        if let Some(importance) = memory.importance {
            if !(0.0..=1.0).contains(&importance) {
                return Err(ClientError::Validation("importance must be between 0 and 1".into()));
            }
        }
        self.with_fallback(
            "add_memory",
            self.cli.add_memory(memory),
            || self.http.add_memory(memory),
        )
        .await
    }

    async fn delete_memory(&self, id: &str) -> Result<()> {
        require_non_empty(id, "memory id")?;
        self.with_fallback(
            "delete_memory",
            self.cli.delete_memory(id),
            || self.http.delete_memory(id),
        )
        .await
    }

    async fn get_memory(&self, id: &str) -> Result<Memory> {
        require_non_empty(id, "memory id")?;
        self.with_fallback("get_memory", self.cli.get_memory(id), || self.http.get_memory(id))
            .await
    }

    async fn create_thread(&self, req: &CreateThread) -> Result<AppendResult> {
        require_non_empty(&req.thread_id, "thread id")?;
        self.with_fallback(
            "create_thread",
            self.cli.create_thread(req),
            || self.http.create_thread(req),
        )
        .await
    }

    async fn append_thread(&self, req: &AppendThread) -> Result<AppendResult> {
        require_non_empty(&req.thread_id, "thread id")?;
        self.with_fallback(
            "append_thread",
            self.cli.append_thread(req),
            || self.http.append_thread(req),
        )
        .await
    }

    async fn read_working_memory(&self) -> Result<WorkingMemory> {
        self.with_fallback(
            "read_working_memory",
            self.cli.read_working_memory(),
            || self.http.read_working_memory(),
        )
        .await
    }

    async fn write_working_memory(&self, content: &str) -> Result<()> {
        require_non_empty(content, "working memory")?;
        self.with_fallback(
            "write_working_memory",
            self.cli.write_working_memory(content),
            || self.http.write_working_memory(content),
        )
        .await
    }

    async fn search_threads(&self, query: &ThreadQuery) -> Result<ThreadSearch> {
        require_non_empty(&query.query, "query")?;
        let query = ThreadQuery {
            query: query.query.trim().to_string(),
            limit: query.limit.clamp(1, MAX_THREAD_SEARCH_LIMIT),
            source: query.source.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
        };
        self.with_fallback(
            "search_threads",
            self.cli.search_threads(&query),
            || self.http.search_threads(&query),
        )
        .await
    }

    async fn fetch_thread(&self, thread_id: &str, offset: usize, limit: usize) -> Result<ThreadPage> {
        require_non_empty(thread_id, "thread id")?;
        let limit = limit.clamp(1, MAX_THREAD_PAGE);
        self.with_fallback(
            "fetch_thread",
            self.cli.fetch_thread(thread_id, offset, limit),
            || self.http.fetch_thread(thread_id, offset, limit),
        )
        .await
    }

    async fn triage_conversation(&self, content: &str) -> Result<TriageVerdict> {
        require_non_empty(content, "conversation")?;
        self.with_fallback(
            "triage_conversation",
            self.cli.triage_conversation(content),
            || self.http.triage_conversation(content),
        )
        .await
    }

    async fn distill_thread(&self, thread_id: &str, content: &str) -> Result<DistillResult> {
        require_non_empty(thread_id, "thread id")?;
        self.with_fallback(
            "distill_thread",
            self.cli.distill_thread(thread_id),
            || self.http.distill_thread(thread_id, content),
        )
        .await
    }

    async fn feed_events(&self, query: &FeedQuery) -> Result<Vec<FeedEvent>> {
        let query = FeedQuery {
            last_n_days: query.last_n_days.clamp(1, 365),
            limit: query.limit.clamp(1, MAX_SEARCH_LIMIT),
            ..query.clone()
        };
        self.with_fallback(
            "feed_events",
            self.cli.feed_events(&query),
            || self.http.feed_events(&query),
        )
        .await
    }

    async fn graph_expand(&self, memory_id: &str, depth: u32) -> Result<GraphNeighborhood> {
        require_non_empty(memory_id, "memory id")?;
        let depth = depth.clamp(1, 3);
        self.with_fallback(
            "graph_expand",
            self.cli.graph_expand(memory_id, depth),
            || self.http.graph_expand(memory_id, depth),
        )
        .await
    }

    /// CLI `status` decides reachability; `/health` adds version details when
    /// available. If the CLI cannot be used at all, `/health` alone decides.
    async fn health(&self) -> Result<HealthStatus> {
        match self.cli.status().await {
            Ok(_) => match self.http.health().await {
                Ok(health) => Ok(health),
                Err(e) => {
                    debug!(error = %e, "health endpoint unavailable");
                    Ok(HealthStatus { reachable: true, ..HealthStatus::default() })
                }
            },
            Err(cli_err) => {
                warn!(error = %cli_err, "nmem status failed, probing api");
                self.http.health().await
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::runner::{ProcessOutput, RunOptions};

    struct ScriptedRunner {
        outputs: Mutex<VecDeque<ProcessOutput>>,
        calls: Mutex<usize>,
    }

    impl ScriptedRunner {
        fn new(outputs: Vec<ProcessOutput>) -> Arc<Self> {
            Arc::new(Self { outputs: Mutex::new(outputs.into()), calls: Mutex::new(0) })
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, _program: &str, _args: &[String], _opts: &RunOptions) -> Result<ProcessOutput> {
            *self.calls.lock() += 1;
            Ok(self.outputs.lock().pop_front().unwrap_or_default())
        }
    }

    fn ok(stdout: &str) -> ProcessOutput {
        ProcessOutput { stdout: stdout.to_string(), ..Default::default() }
    }

    fn fail(stderr: &str) -> ProcessOutput {
        ProcessOutput { stderr: stderr.to_string(), exit_code: 2, ..Default::default() }
    }

    fn client(runner: Arc<ScriptedRunner>, url: &str) -> MemoryClient {
        let config = ResolvedConfig { api_url: url.to_string(), ..Default::default() };
        MemoryClient::with_runner(runner, &config)
    }

    #[tokio::test]
    async fn unsupported_cli_falls_back_to_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads/t-1/append"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messages_added": 4})))
            .expect(1)
            .mount(&server)
            .await;

        let runner = ScriptedRunner::new(vec![
            ok("nmem 0.5"),
            fail("nmem t: error: argument action: invalid choice: 'append'"),
        ]);
        let client = client(runner, &server.uri());

        let req = AppendThread { thread_id: "t-1".into(), messages: vec![], idempotency_key: "k".into() };
        let result = client.append_thread(&req).await.unwrap();
        assert_eq!(result.messages_added, 4);
    }

    #[tokio::test]
    async fn other_cli_errors_do_not_fall_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/memories/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"memories": []})))
            .expect(0)
            .mount(&server)
            .await;

        let runner = ScriptedRunner::new(vec![ok("nmem 0.6"), fail("Permission denied")]);
        let client = client(runner, &server.uri());

        let err = client.search("rust", 5).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn thread_not_found_is_surfaced_as_not_found() {
        let runner = ScriptedRunner::new(vec![ok("nmem 0.6"), fail("Error: thread memlink-x not found")]);
        let client = client(runner, "http://127.0.0.1:9");
        let req = AppendThread { thread_id: "memlink-x".into(), messages: vec![], idempotency_key: "k".into() };
        assert!(client.append_thread(&req).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn validation_runs_before_any_transport() {
        let runner = ScriptedRunner::new(vec![]);
        let client = client(runner.clone(), "http://127.0.0.1:9");

        assert_matches!(client.search("  ", 5).await, Err(ClientError::Validation(_)));
        assert_matches!(client.delete_memory("").await, Err(ClientError::Validation(_)));
        let bad = NewMemory { content: "x".into(), importance: Some(1.5), ..Default::default() };
        assert_matches!(client.add_memory(&bad).await, Err(ClientError::Validation(_)));
        assert_eq!(*runner.calls.lock(), 0);
    }

    #[tokio::test]
    async fn empty_store_search_is_empty_not_error() {
        let runner = ScriptedRunner::new(vec![ok("nmem 0.6"), ok(r#"{"memories": []}"#)]);
        let client = client(runner, "http://127.0.0.1:9");
        let hits = client.search("never queried term", 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn working_memory_write_falls_back_to_api() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/agent/working-memory"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let runner = ScriptedRunner::new(vec![
            ok("nmem 0.5"),
            fail("nmem wm: error: argument action: invalid choice: 'write'"),
        ]);
        client(runner, &server.uri()).write_working_memory("Focus: ship").await.unwrap();
    }

    #[tokio::test]
    async fn thread_search_is_validated_and_clamped() {
        let runner = ScriptedRunner::new(vec![ok("nmem 0.6"), ok(r#"{"threads": []}"#)]);
        let client = client(runner.clone(), "http://127.0.0.1:9");

        let blank = ThreadQuery { query: " ".into(), limit: 5, source: None };
        assert_matches!(client.search_threads(&blank).await, Err(ClientError::Validation(_)));
        assert_eq!(*runner.calls.lock(), 0);

        let wide = ThreadQuery { query: "deploy".into(), limit: 500, source: Some(" ".into()) };
        let found = client.search_threads(&wide).await.unwrap();
        assert!(found.threads.is_empty());
        assert_eq!(*runner.calls.lock(), 2);
    }

    #[tokio::test]
    async fn health_combines_cli_status_and_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "version": "0.6.2", "database_connected": true
            })))
            .mount(&server)
            .await;

        let runner = ScriptedRunner::new(vec![ok("nmem 0.6"), ok("Server: running")]);
        let health = client(runner, &server.uri()).health().await.unwrap();
        assert!(health.reachable);
        assert_eq!(health.version.as_deref(), Some("0.6.2"));
    }

    #[tokio::test]
    async fn health_without_cli_uses_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "0.6.2"})))
            .mount(&server)
            .await;

        let runner = ScriptedRunner::new(vec![fail("missing"), fail("missing")]);
        let health = client(runner, &server.uri()).health().await.unwrap();
        assert!(health.reachable);
    }
}
