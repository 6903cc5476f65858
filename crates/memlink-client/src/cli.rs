//! `nmem` CLI transport.
//!
//! Invocation shape: `<binary> [base-args] [--api-url <url>] <subcommand> <args...>`.
//! The binary is resolved once by probing `--version` and cached on the
//! transport. The API key only ever reaches the child through `NMEM_API_KEY`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use memlink_settings::{ApiKey, ResolvedConfig};

use crate::errors::{ClientError, ErrorKind, Result};
use crate::runner::{CommandRunner, RunOptions};
use crate::types::{
    AppendResult, AppendThread, CreateThread, DistillResult, FeedEvent, FeedQuery,
    GraphNeighborhood, Memory, NewMemory, SearchResult, ThreadPage, ThreadQuery, ThreadSearch,
    TriageVerdict, WorkingMemory, parse_created_id, parse_feed_events, parse_search_results,
};

/// Invocations tried in order when resolving the CLI.
pub const COMMAND_CANDIDATES: &[&[&str]] = &[&["nmem"], &["uvx", "--from", "nmem-cli", "nmem"]];

/// Environment variable carrying the API key to the child process.
pub const API_KEY_ENV: &str = "NMEM_API_KEY";

/// Time bounds for CLI calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CliTimeouts {
    /// `--version` check per candidate.
    pub version_check: Duration,
    /// Ordinary commands.
    pub general: Duration,
    /// Working-memory reads.
    pub working_memory: Duration,
}

impl Default for CliTimeouts {
    fn default() -> Self {
        Self {
            version_check: Duration::from_secs(10),
            general: Duration::from_secs(30),
            working_memory: Duration::from_secs(20),
        }
    }
}

/// CLI transport with a cached resolved command.
pub struct CliTransport {
    runner: Arc<dyn CommandRunner>,
    resolved: Mutex<Option<Vec<String>>>,
    api_url: Option<String>,
    api_key: Option<ApiKey>,
    timeouts: CliTimeouts,
}

fn to_args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

/// Loggable label for a subcommand: the leading non-flag words, never values.
fn operation_label(sub: &[String]) -> String {
    let words: Vec<&str> = sub
        .iter()
        .filter(|a| !a.starts_with('-'))
        .take(2)
        .map(String::as_str)
        .collect();
    format!("nmem {}", words.join(" "))
}

impl CliTransport {
    /// Build a transport from resolved config.
    pub fn new(runner: Arc<dyn CommandRunner>, config: &ResolvedConfig) -> Self {
        Self {
            runner,
            resolved: Mutex::new(None),
            api_url: config.has_custom_api_url().then(|| config.api_url.clone()),
            api_key: config.api_key.clone(),
            timeouts: CliTimeouts::default(),
        }
    }

    /// Override the default time bounds.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: CliTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Cached command, if resolution already happened.
    pub fn resolved_command(&self) -> Option<String> {
        self.resolved.lock().as_ref().map(|parts| parts.join(" "))
    }

    fn child_env(&self) -> Vec<(String, String)> {
        self.api_key
            .as_ref()
            .map(|key| vec![(API_KEY_ENV.to_string(), key.expose().to_string())])
            .unwrap_or_default()
    }

    /// Resolve (and cache) the first candidate whose `--version` succeeds.
    pub async fn resolve_command(&self) -> Result<Vec<String>> {
        let cached = self.resolved.lock().clone();
        if let Some(cmd) = cached {
            return Ok(cmd);
        }

        for candidate in COMMAND_CANDIDATES {
            let program = candidate[0];
            let mut args = to_args(&candidate[1..]);
            args.push("--version".to_string());

            let opts = RunOptions::with_timeout(self.timeouts.version_check);
            match self.runner.run(program, &args, &opts).await {
                Ok(out) if out.success() => {
                    let cmd = to_args(candidate);
                    info!(command = %cmd.join(" "), "nmem resolved");
                    *self.resolved.lock() = Some(cmd.clone());
                    return Ok(cmd);
                }
                Ok(out) => {
                    debug!(program, exit_code = out.exit_code, timed_out = out.timed_out, "nmem version check failed");
                }
                Err(e) => debug!(program, error = %e, "nmem version check failed"),
            }
        }

        Err(ClientError::NmemNotFound)
    }

    /// Run a subcommand and return trimmed stdout.
    pub async fn exec(&self, sub: &[String], timeout: Duration) -> Result<String> {
        let cmd = self.resolve_command().await?;
        let program = &cmd[0];
        let mut args: Vec<String> = cmd[1..].to_vec();
        if let Some(url) = &self.api_url {
            args.push("--api-url".to_string());
            args.push(url.clone());
        }
        args.extend_from_slice(sub);

        let label = operation_label(sub);
        let opts = RunOptions {
            env: self.child_env(),
            ..RunOptions::with_timeout(timeout)
        };
        let out = self.runner.run(program, &args, &opts).await?;

        if out.timed_out {
            return Err(ClientError::Timeout {
                operation: label,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }
        if out.interrupted {
            return Err(ClientError::Cancelled(label));
        }
        if out.exit_code != 0 {
            let stderr = out.stderr.trim();
            let message = if stderr.is_empty() { out.stdout.trim() } else { stderr };
            warn!(operation = %label, exit_code = out.exit_code, "nmem command failed");
            return Err(ClientError::Cli {
                message: message.to_string(),
                exit_code: out.exit_code,
            });
        }
        Ok(out.stdout.trim().to_string())
    }

    /// Run a `--json` subcommand and parse stdout.
    pub async fn exec_json(&self, sub: &[String], timeout: Duration) -> Result<Value> {
        let raw = self.exec(sub, timeout).await?;
        if raw.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&raw).map_err(|e| ClientError::InvalidJson(e.to_string()))
    }

    // ── Operations ──────────────────────────────────────────────────

    /// `--json m search <query> -n <limit>`
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let mut sub = to_args(&["--json", "m", "search", query, "-n"]);
        sub.push(limit.to_string());
        let data = self.exec_json(&sub, self.timeouts.general).await?;
        Ok(parse_search_results(&data))
    }

    /// `--json m add <content> [-t title] [-i importance] [-l label]... [--unit-type t]`
    ///
    /// Older CLIs reject `--unit-type`; the save is retried without it.
    pub async fn add_memory(&self, memory: &NewMemory) -> Result<String> {
        let sub = add_args(memory, true);
        match self.exec_json(&sub, self.timeouts.general).await {
            Ok(data) => Ok(parse_created_id(&data)),
            Err(e) if memory.unit_type.is_some() && e.kind() == ErrorKind::Unsupported => {
                debug!("nmem rejected --unit-type, retrying without it");
                let data = self.exec_json(&add_args(memory, false), self.timeouts.general).await?;
                Ok(parse_created_id(&data))
            }
            Err(e) => Err(e),
        }
    }

    /// `--json m delete -f <id>`
    pub async fn delete_memory(&self, id: &str) -> Result<()> {
        let _ = self
            .exec_json(&to_args(&["--json", "m", "delete", "-f", id]), self.timeouts.general)
            .await?;
        Ok(())
    }

    /// `--json m show <id>`
    pub async fn get_memory(&self, id: &str) -> Result<Memory> {
        let data = self
            .exec_json(&to_args(&["--json", "m", "show", id]), self.timeouts.general)
            .await?;
        Ok(Memory::from_value(&data))
    }

    /// `--json t create --id <id> -t <title> -s <source> --messages <json>`
    pub async fn create_thread(&self, req: &CreateThread) -> Result<AppendResult> {
        let messages = serde_json::to_string(&req.messages)
            .map_err(|e| ClientError::Validation(e.to_string()))?;
        let sub = to_args(&[
            "--json", "t", "create", "--id", &req.thread_id, "-t", &req.title, "-s", &req.source,
            "--messages", &messages,
        ]);
        let data = self.exec_json(&sub, self.timeouts.general).await?;
        let mut result = AppendResult::from_value(&data);
        if result.messages_added == 0 {
            result.messages_added = req.messages.len();
        }
        Ok(result)
    }

    /// `--json t append <id> --messages <json> --idempotency-key <key>`
    pub async fn append_thread(&self, req: &AppendThread) -> Result<AppendResult> {
        let messages = serde_json::to_string(&req.messages)
            .map_err(|e| ClientError::Validation(e.to_string()))?;
        let sub = to_args(&[
            "--json", "t", "append", &req.thread_id, "--messages", &messages,
            "--idempotency-key", &req.idempotency_key,
        ]);
        let data = self.exec_json(&sub, self.timeouts.general).await?;
        Ok(AppendResult::from_value(&data))
    }

    /// `--json wm read`
    pub async fn read_working_memory(&self) -> Result<WorkingMemory> {
        let data = self
            .exec_json(&to_args(&["--json", "wm", "read"]), self.timeouts.working_memory)
            .await?;
        Ok(WorkingMemory::from_value(&data))
    }

    /// `--json wm write --content <text>`
    pub async fn write_working_memory(&self, content: &str) -> Result<()> {
        let _ = self
            .exec_json(&to_args(&["--json", "wm", "write", "--content", content]), self.timeouts.working_memory)
            .await?;
        Ok(())
    }

    /// `--json t search <query> -n <limit> [--source <s>]`
    pub async fn search_threads(&self, query: &ThreadQuery) -> Result<ThreadSearch> {
        let mut sub = to_args(&["--json", "t", "search", query.query.as_str(), "-n"]);
        sub.push(query.limit.to_string());
        if let Some(source) = &query.source {
            sub.push("--source".to_string());
            sub.push(source.clone());
        }
        let data = self.exec_json(&sub, self.timeouts.general).await?;
        Ok(ThreadSearch::from_value(&data))
    }

    /// `--json t show <id> --offset <n> --limit <n>`
    pub async fn fetch_thread(&self, thread_id: &str, offset: usize, limit: usize) -> Result<ThreadPage> {
        let mut sub = to_args(&["--json", "t", "show", thread_id, "--offset"]);
        sub.push(offset.to_string());
        sub.push("--limit".to_string());
        sub.push(limit.to_string());
        let data = self.exec_json(&sub, self.timeouts.general).await?;
        Ok(ThreadPage::from_value(&data))
    }

    /// `--json t triage --content <text>`
    pub async fn triage_conversation(&self, content: &str) -> Result<TriageVerdict> {
        let data = self
            .exec_json(&to_args(&["--json", "t", "triage", "--content", content]), self.timeouts.general)
            .await?;
        Ok(TriageVerdict::from_value(&data))
    }

    /// `--json t distill <thread-id>`
    pub async fn distill_thread(&self, thread_id: &str) -> Result<DistillResult> {
        let data = self
            .exec_json(&to_args(&["--json", "t", "distill", thread_id]), self.timeouts.general)
            .await?;
        Ok(DistillResult::from_value(&data))
    }

    /// `--json feed --days <n> -n <limit> [--type <t>] [--all]`
    pub async fn feed_events(&self, query: &FeedQuery) -> Result<Vec<FeedEvent>> {
        let mut sub = to_args(&["--json", "feed", "--days"]);
        sub.push(query.last_n_days.to_string());
        sub.push("-n".to_string());
        sub.push(query.limit.to_string());
        if let Some(kind) = &query.event_type {
            sub.push("--type".to_string());
            sub.push(kind.clone());
        }
        if !query.tier1_only {
            sub.push("--all".to_string());
        }
        let data = self.exec_json(&sub, self.timeouts.general).await?;
        Ok(parse_feed_events(&data))
    }

    /// `--json g expand <id> --depth <n>`
    pub async fn graph_expand(&self, memory_id: &str, depth: u32) -> Result<GraphNeighborhood> {
        let mut sub = to_args(&["--json", "g", "expand", memory_id, "--depth"]);
        sub.push(depth.to_string());
        let data = self.exec_json(&sub, self.timeouts.general).await?;
        Ok(GraphNeighborhood::from_value(&data))
    }

    /// `status`; plain text, success means the backend answered.
    pub async fn status(&self) -> Result<String> {
        self.exec(&to_args(&["status"]), self.timeouts.general).await
    }
}

fn add_args(memory: &NewMemory, with_unit_type: bool) -> Vec<String> {
    let mut sub = to_args(&["--json", "m", "add", &memory.content]);
    if let Some(title) = memory.title.as_deref().filter(|t| !t.trim().is_empty()) {
        sub.push("-t".to_string());
        sub.push(title.to_string());
    }
    if let Some(importance) = memory.importance {
        sub.push("-i".to_string());
        sub.push(importance.to_string());
    }
    for label in &memory.labels {
        sub.push("-l".to_string());
        sub.push(label.clone());
    }
    if with_unit_type {
        if let Some(unit_type) = &memory.unit_type {
            sub.push("--unit-type".to_string());
            sub.push(unit_type.clone());
        }
    }
    sub
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use assert_matches::assert_matches;
    use async_trait::async_trait;

    use super::*;
    use crate::runner::ProcessOutput;

    /// One recorded invocation.
    #[derive(Clone, Debug)]
    struct Call {
        program: String,
        args: Vec<String>,
        env: Vec<(String, String)>,
    }

    /// Runner that replays scripted outputs and records every call.
    struct ScriptedRunner {
        outputs: Mutex<VecDeque<ProcessOutput>>,
        calls: Mutex<Vec<Call>>,
    }

    impl ScriptedRunner {
        fn new(outputs: Vec<ProcessOutput>) -> Arc<Self> {
            Arc::new(Self {
                outputs: Mutex::new(outputs.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, program: &str, args: &[String], opts: &RunOptions) -> Result<ProcessOutput> {
            self.calls.lock().push(Call {
                program: program.to_string(),
                args: args.to_vec(),
                env: opts.env.clone(),
            });
            Ok(self.outputs.lock().pop_front().unwrap_or_default())
        }
    }

    fn ok(stdout: &str) -> ProcessOutput {
        ProcessOutput { stdout: stdout.to_string(), ..Default::default() }
    }

    fn fail(code: i32, stderr: &str) -> ProcessOutput {
        ProcessOutput { stderr: stderr.to_string(), exit_code: code, ..Default::default() }
    }

    fn transport(runner: Arc<ScriptedRunner>, config: &ResolvedConfig) -> CliTransport {
        CliTransport::new(runner, config)
    }

    // ── resolution ──────────────────────────────────────────────────

    #[tokio::test]
    async fn resolves_plain_nmem_first_and_caches() {
        let runner = ScriptedRunner::new(vec![ok("nmem 0.6.0"), ok("{}"), ok("{}")]);
        let cli = transport(runner.clone(), &ResolvedConfig::default());

        let _ = cli.exec_json(&to_args(&["--json", "wm", "read"]), Duration::from_secs(1)).await.unwrap();
        let _ = cli.exec_json(&to_args(&["--json", "wm", "read"]), Duration::from_secs(1)).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 3, "one version check, two commands");
        assert_eq!(calls[0].args, vec!["--version"]);
        assert_eq!(cli.resolved_command().as_deref(), Some("nmem"));
    }

    #[tokio::test]
    async fn falls_back_to_uvx() {
        let runner = ScriptedRunner::new(vec![fail(127, "not found"), ok("nmem 0.6.0")]);
        let cli = transport(runner.clone(), &ResolvedConfig::default());

        let cmd = cli.resolve_command().await.unwrap();
        assert_eq!(cmd, vec!["uvx", "--from", "nmem-cli", "nmem"]);
        assert_eq!(runner.calls()[1].program, "uvx");
        assert_eq!(runner.calls()[1].args, vec!["--from", "nmem-cli", "nmem", "--version"]);
    }

    #[tokio::test]
    async fn neither_candidate_is_nmem_not_found() {
        let runner = ScriptedRunner::new(vec![fail(127, ""), fail(1, "")]);
        let cli = transport(runner, &ResolvedConfig::default());
        assert_matches!(cli.resolve_command().await, Err(ClientError::NmemNotFound));
        assert!(cli.resolved_command().is_none());
    }

    // ── invocation shape ────────────────────────────────────────────

    #[tokio::test]
    async fn api_key_goes_to_env_never_args() {
        let config = ResolvedConfig {
            api_url: "https://mem.example.com".into(),
            api_key: Some(ApiKey::new("sk-secret")),
            ..Default::default()
        };
        let runner = ScriptedRunner::new(vec![ok("nmem 0.6"), ok(r#"{"memories": []}"#)]);
        let cli = transport(runner.clone(), &config);

        let _ = cli.search("rust", 5).await.unwrap();

        let call = &runner.calls()[1];
        assert_eq!(
            call.args,
            vec!["--api-url", "https://mem.example.com", "--json", "m", "search", "rust", "-n", "5"]
        );
        assert!(call.args.iter().all(|a| !a.contains("sk-secret")));
        assert_eq!(call.env, vec![("NMEM_API_KEY".to_string(), "sk-secret".to_string())]);
    }

    #[tokio::test]
    async fn default_url_is_not_passed() {
        let runner = ScriptedRunner::new(vec![ok("nmem 0.6"), ok("{}")]);
        let cli = transport(runner.clone(), &ResolvedConfig::default());
        let _ = cli.delete_memory("m1").await.unwrap();
        assert_eq!(runner.calls()[1].args, vec!["--json", "m", "delete", "-f", "m1"]);
        assert!(runner.calls()[1].env.is_empty());
    }

    // ── failures ────────────────────────────────────────────────────

    #[tokio::test]
    async fn non_zero_exit_uses_stderr_then_stdout() {
        let runner = ScriptedRunner::new(vec![
            ok("nmem 0.6"),
            fail(1, "Thread abc not found"),
            ProcessOutput { stdout: "boom on stdout".into(), exit_code: 2, ..Default::default() },
        ]);
        let cli = transport(runner, &ResolvedConfig::default());

        let err = cli.exec(&to_args(&["x"]), Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_not_found());

        let err = cli.exec(&to_args(&["x"]), Duration::from_secs(1)).await.unwrap_err();
        assert_matches!(err, ClientError::Cli { message, exit_code: 2 } if message == "boom on stdout");
    }

    #[tokio::test]
    async fn unparseable_output_is_invalid_json() {
        let runner = ScriptedRunner::new(vec![ok("nmem 0.6"), ok("Searching...\nnot json")]);
        let cli = transport(runner, &ResolvedConfig::default());
        let err = cli.search("q", 5).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidJson);
    }

    #[tokio::test]
    async fn timeout_is_an_error() {
        let runner = ScriptedRunner::new(vec![
            ok("nmem 0.6"),
            ProcessOutput { timed_out: true, exit_code: -1, ..Default::default() },
        ]);
        let cli = transport(runner, &ResolvedConfig::default());
        let err = cli.read_working_memory().await.unwrap_err();
        assert_matches!(err, ClientError::Timeout { timeout_ms: 20_000, .. });
    }

    // ── operations ──────────────────────────────────────────────────

    #[tokio::test]
    async fn add_retries_without_unit_type() {
        let runner = ScriptedRunner::new(vec![
            ok("nmem 0.6"),
            fail(2, "nmem: error: unrecognized arguments: --unit-type decision"),
            ok(r#"{"id": "m-42"}"#),
        ]);
        let cli = transport(runner.clone(), &ResolvedConfig::default());

        let memory = NewMemory {
            content: "Use sqlite".into(),
            title: Some("DB choice".into()),
            importance: Some(0.8),
            unit_type: Some("decision".into()),
            ..Default::default()
        };
        let id = cli.add_memory(&memory).await.unwrap();
        assert_eq!(id, "m-42");

        let calls = runner.calls();
        assert!(calls[1].args.contains(&"--unit-type".to_string()));
        assert!(!calls[2].args.contains(&"--unit-type".to_string()));
        assert!(calls[2].args.contains(&"-t".to_string()));
    }

    #[tokio::test]
    async fn append_passes_idempotency_key() {
        let runner = ScriptedRunner::new(vec![ok("nmem 0.6"), ok(r#"{"messages_added": 2}"#)]);
        let cli = transport(runner.clone(), &ResolvedConfig::default());

        let req = AppendThread {
            thread_id: "memlink-main-abc".into(),
            messages: vec![],
            idempotency_key: "batch-123".into(),
        };
        let result = cli.append_thread(&req).await.unwrap();
        assert_eq!(result.messages_added, 2);

        let args = &runner.calls()[1].args;
        assert_eq!(&args[..4], &["--json", "t", "append", "memlink-main-abc"]);
        assert_eq!(args.last().map(String::as_str), Some("batch-123"));
    }

    #[tokio::test]
    async fn create_defaults_added_to_message_count() {
        let runner = ScriptedRunner::new(vec![ok("nmem 0.6"), ok(r#"{"id": "t1"}"#)]);
        let cli = transport(runner, &ResolvedConfig::default());
        let req = CreateThread {
            thread_id: "t1".into(),
            title: "T".into(),
            source: "memlink".into(),
            messages: vec![crate::types::ThreadMessage {
                role: "user".into(),
                content: "hi there".into(),
                timestamp: None,
                external_id: "msg-1".into(),
            }],
        };
        assert_eq!(cli.create_thread(&req).await.unwrap().messages_added, 1);
    }

    #[tokio::test]
    async fn thread_search_and_fetch_args() {
        let runner = ScriptedRunner::new(vec![
            ok("nmem 0.6"),
            ok(r#"{"threads": [{"thread_id": "t1", "title": "TLS"}], "total_found": 1}"#),
            ok(r#"{"thread": {"id": "t1", "message_count": 3}, "messages": [{"role": "user", "content": "hi"}]}"#),
        ]);
        let cli = transport(runner.clone(), &ResolvedConfig::default());

        let query = ThreadQuery { query: "tls stack".into(), limit: 5, source: Some("memlink".into()) };
        let found = cli.search_threads(&query).await.unwrap();
        assert_eq!(found.threads[0].title, "TLS");

        let page = cli.fetch_thread("t1", 2, 50).await.unwrap();
        assert_eq!(page.message_count, 3);

        let calls = runner.calls();
        assert_eq!(
            calls[1].args,
            vec!["--json", "t", "search", "tls stack", "-n", "5", "--source", "memlink"]
        );
        assert_eq!(calls[2].args, vec!["--json", "t", "show", "t1", "--offset", "2", "--limit", "50"]);
    }

    #[test]
    fn operation_label_skips_values_and_flags() {
        let sub = to_args(&["--json", "m", "search", "secret query", "-n", "5"]);
        assert_eq!(operation_label(&sub), "nmem m search");
    }
}
