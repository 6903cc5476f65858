//! User-invoked commands: search, remember, forget, status, working memory,
//! thread search and the read-only lookups (show, timeline, connections).
//!
//! Unlike recall and digest, these are explicit requests, so transport
//! failures are reported back. They are reported as a short
//! [`CommandReply`], never as an error chain.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use memlink_client::{
    ClientError, ErrorKind, FeedQuery, MemoryBackend, NewMemory, SearchResult, ThreadQuery,
};
use memlink_core::text::{collapse_whitespace, truncate_with_suffix};
use memlink_settings::{DEFAULT_API_URL, ResolvedConfig};

/// Default number of hits for `search` and `forget`.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Default number of threads for `threads search`.
pub const DEFAULT_THREAD_SEARCH_LIMIT: usize = 5;

/// Default page size for `threads show`.
pub const DEFAULT_THREAD_PAGE: usize = 50;

/// Knowledge unit types accepted by `remember`.
pub const UNIT_TYPES: &[&str] = &[
    "fact",
    "preference",
    "decision",
    "plan",
    "procedure",
    "learning",
    "context",
    "event",
];

static MEMORY_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{8,}$").ok());

/// Whether `input` looks like a memory id rather than a query.
pub fn is_likely_memory_id(input: &str) -> bool {
    MEMORY_ID.as_ref().is_some_and(|re| re.is_match(input))
}

// ─────────────────────────────────────────────────────────────────────────────
// Replies and policies
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a command, ready to show to a user.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommandReply {
    /// Whether the command did what was asked.
    pub ok: bool,
    /// Human-readable message.
    pub text: String,
    /// Machine-readable details.
    pub details: Value,
}

impl CommandReply {
    fn success(text: impl Into<String>, details: Value) -> Self {
        Self { ok: true, text: text.into(), details }
    }

    fn failure(text: impl Into<String>) -> Self {
        Self { ok: false, text: text.into(), details: Value::Null }
    }
}

/// Skip saving when an existing memory is this similar.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DedupPolicy {
    /// Whether to search before saving at all.
    pub enabled: bool,
    /// Minimum score of the top hit that counts as a duplicate.
    pub threshold: f64,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self { enabled: true, threshold: 0.9 }
    }
}

/// Delete the top search hit when it scores at least this much.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ForgetPolicy {
    /// Minimum score for deleting without confirmation.
    pub threshold: f64,
}

impl Default for ForgetPolicy {
    fn default() -> Self {
        Self { threshold: 0.85 }
    }
}

/// Input for [`remember`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RememberRequest {
    /// Text to save.
    pub text: String,
    /// Optional title.
    pub title: Option<String>,
    /// Optional importance in `[0, 1]`.
    pub importance: Option<f64>,
    /// Optional unit type, one of [`UNIT_TYPES`].
    pub unit_type: Option<String>,
    /// Labels.
    pub labels: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn preview(text: &str, max: usize) -> String {
    truncate_with_suffix(&collapse_whitespace(text), max, "...")
}

fn title_or_untitled(r: &SearchResult) -> &str {
    match r.title.trim() {
        "" => "(untitled)",
        t => t,
    }
}

fn percent(score: f64) -> String {
    format!("{:.0}%", (score * 100.0).clamp(0.0, 100.0))
}

/// One-line description of a client error for users.
pub fn describe_error(err: &ClientError) -> String {
    match err.kind() {
        ErrorKind::NmemNotFound => err.to_string(),
        ErrorKind::Network => format!("memory service not reachable ({err})"),
        _ => {
            let text = err.to_string();
            preview(text.lines().next().unwrap_or_default(), 200)
        }
    }
}

fn hit_json(r: &SearchResult) -> Value {
    json!({"id": r.id, "title": r.title, "score": r.score, "importance": r.importance})
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Search memories.
pub async fn search(backend: &dyn MemoryBackend, query: &str, limit: usize) -> CommandReply {
    let query = query.trim();
    if query.is_empty() {
        return CommandReply::failure("Usage: search <query>");
    }

    let results = match backend.search(query, limit).await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, kind = %e.kind(), "search command failed");
            return CommandReply::failure(format!("Search failed: {}", describe_error(&e)));
        }
    };

    if results.is_empty() {
        return CommandReply::success(
            format!("No memories found for: \"{query}\""),
            json!({"count": 0, "results": []}),
        );
    }

    let lines: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{}. {} ({})  id: {}\n   {}",
                i + 1,
                title_or_untitled(r),
                percent(r.score),
                r.id,
                preview(&r.content, 150)
            )
        })
        .collect();
    debug!(count = results.len(), "search command");
    CommandReply::success(
        format!("Found {} memories:\n\n{}", results.len(), lines.join("\n\n")),
        json!({"count": results.len(), "results": results.iter().map(hit_json).collect::<Vec<_>>()}),
    )
}

/// Save a memory, unless a near-identical one already exists.
///
/// The duplicate check is best-effort: if it fails the memory is saved
/// anyway.
pub async fn remember(
    backend: &dyn MemoryBackend,
    req: &RememberRequest,
    dedup: &DedupPolicy,
) -> CommandReply {
    let text = req.text.trim();
    if text.is_empty() {
        return CommandReply::failure("Cannot save an empty memory.");
    }
    if req.importance.is_some_and(|i| !(0.0..=1.0).contains(&i)) {
        return CommandReply::failure("Importance must be between 0 and 1.");
    }

    if dedup.enabled {
        match backend.search(text, 1).await {
            Ok(hits) => {
                if let Some(top) = hits.first().filter(|h| h.score >= dedup.threshold) {
                    info!(id = %top.id, score = top.score, "remember: near-duplicate exists, skipping");
                    return CommandReply::success(
                        format!(
                            "Similar memory already exists: \"{}\" (id: {}, {} match). Not saved.",
                            title_or_untitled(top),
                            top.id,
                            percent(top.score)
                        ),
                        json!({"action": "skipped_duplicate", "id": top.id, "score": top.score}),
                    );
                }
            }
            Err(e) => debug!(error = %e, "remember: duplicate check failed, saving anyway"),
        }
    }

    let unit_type = req.unit_type.as_deref().map(str::trim).filter(|t| {
        let known = UNIT_TYPES.contains(t);
        if !known {
            debug!(unit_type = t, "remember: ignoring unknown unit type");
        }
        known
    });

    let memory = NewMemory {
        content: text.to_string(),
        title: req.title.as_deref().map(str::trim).filter(|t| !t.is_empty()).map(str::to_string),
        importance: req.importance,
        labels: req.labels.clone(),
        unit_type: unit_type.map(str::to_string),
    };

    match backend.add_memory(&memory).await {
        Ok(id) => {
            info!(%id, "remember: saved");
            CommandReply::success(
                format!("Remembered: \"{}\" (id: {id})", preview(text, 60)),
                json!({"action": "saved", "id": id}),
            )
        }
        Err(e) => {
            warn!(error = %e, kind = %e.kind(), "remember command failed");
            CommandReply::failure(format!("Failed to save memory: {}", describe_error(&e)))
        }
    }
}

/// Delete a memory by id, or by a confident search match.
///
/// An id-shaped input that the store does not know is retried as a query.
pub async fn forget(backend: &dyn MemoryBackend, input: &str, policy: &ForgetPolicy) -> CommandReply {
    let input = input.trim();
    if input.is_empty() {
        return CommandReply::failure("Usage: forget <memory id or search query>");
    }

    if is_likely_memory_id(input) {
        match backend.delete_memory(input).await {
            Ok(()) => {
                info!(id = input, "forget: deleted");
                return CommandReply::success(
                    format!("Forgotten: memory {input} deleted."),
                    json!({"action": "deleted", "id": input}),
                );
            }
            Err(e) if e.is_not_found() => {
                debug!(input, "forget: not an id, searching instead");
            }
            Err(e) => {
                warn!(error = %e, kind = %e.kind(), "forget by id failed");
                return CommandReply::failure(format!(
                    "Failed to delete memory {input}: {}",
                    describe_error(&e)
                ));
            }
        }
    }

    let results = match backend.search(input, DEFAULT_SEARCH_LIMIT).await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, kind = %e.kind(), "forget search failed");
            return CommandReply::failure(format!("Search failed: {}", describe_error(&e)));
        }
    };

    let Some(top) = results.first() else {
        return CommandReply::success(
            format!("No matching memories found for: \"{input}\""),
            json!({"action": "none", "found": 0}),
        );
    };

    if results.len() == 1 || top.score >= policy.threshold {
        return match backend.delete_memory(&top.id).await {
            Ok(()) => {
                info!(id = %top.id, score = top.score, "forget: deleted via search");
                let label = if top.title.trim().is_empty() {
                    preview(&top.content, 60)
                } else {
                    top.title.clone()
                };
                CommandReply::success(
                    format!("Forgotten: \"{label}\" (id: {})", top.id),
                    json!({"action": "deleted", "id": top.id}),
                )
            }
            Err(e) => {
                warn!(error = %e, kind = %e.kind(), "forget delete failed");
                CommandReply::failure(format!("Found a match but delete failed: {}", describe_error(&e)))
            }
        };
    }

    let lines: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {} ({})  id: {}", i + 1, title_or_untitled(r), percent(r.score), r.id))
        .collect();
    CommandReply {
        ok: false,
        text: format!("Multiple matches. Run forget <id> with one of:\n\n{}", lines.join("\n")),
        details: json!({
            "action": "confirm",
            "candidates": results.iter().map(hit_json).collect::<Vec<_>>(),
        }),
    }
}

/// Effective configuration, where each value came from, and backend health.
pub async fn status(
    backend: &dyn MemoryBackend,
    config: &ResolvedConfig,
    cli_command: Option<&str>,
) -> CommandReply {
    let remote = config.has_custom_api_url();
    let mut lines = vec![
        if remote {
            format!("Mode: remote ({})", config.effective_api_url())
        } else {
            format!("Mode: local ({DEFAULT_API_URL})")
        },
        format!("API key: {}", if config.api_key.is_some() { "set" } else { "not set" }),
        match cli_command {
            Some(cmd) => format!("CLI: {cmd}"),
            None => "CLI: not found (install with: pip install nmem-cli)".to_string(),
        },
    ];

    let health = backend.health().await;
    let (reachable, version, database) = match &health {
        Ok(h) => (h.reachable, h.version.clone(), h.database_connected),
        Err(e) => {
            debug!(error = %e, "status: health check failed");
            (false, None, None)
        }
    };

    if reachable {
        lines.push("Backend: reachable".into());
        if let Some(v) = &version {
            lines.push(format!("Version: {v}"));
        }
        if let Some(db) = database {
            lines.push(format!("Database: {}", if db { "connected" } else { "disconnected" }));
        }
    } else {
        lines.push("Backend: not reachable".into());
        if remote {
            lines.push("  Check that apiUrl is correct and the server is running.".into());
            if config.api_key.is_none() {
                lines.push("  Remote mode usually requires an API key.".into());
            }
        } else {
            lines.push("  Make sure the local memory service is running.".into());
        }
    }

    lines.push(String::new());
    lines.push("Config (source):".into());
    let mut config_details = serde_json::Map::new();
    for (key, value, source) in config.describe() {
        lines.push(format!("  {key}: {value} ({source})"));
        let _ = config_details.insert(
            key.to_string(),
            json!({"value": value, "source": source.to_string()}),
        );
    }

    CommandReply::success(
        lines.join("\n"),
        json!({
            "mode": if remote { "remote" } else { "local" },
            "apiUrl": config.effective_api_url(),
            "apiKeySet": config.api_key.is_some(),
            "cli": cli_command,
            "healthy": reachable,
            "version": version,
            "databaseConnected": database,
            "config": config_details,
        }),
    )
}

/// Show one memory in full.
pub async fn show(backend: &dyn MemoryBackend, id: &str) -> CommandReply {
    let id = id.trim();
    if id.is_empty() {
        return CommandReply::failure("Usage: show <memory id>");
    }
    match backend.get_memory(id).await {
        Ok(m) => {
            let mut text = String::new();
            if !m.title.trim().is_empty() {
                text.push_str(&format!("# {}\n\n", m.title.trim()));
            }
            text.push_str(m.content.trim());
            text.push_str(&format!("\n\nid: {}  importance: {:.2}", m.id, m.importance));
            if !m.labels.is_empty() {
                text.push_str(&format!("  labels: {}", m.labels.join(", ")));
            }
            CommandReply::success(text, json!({"id": m.id, "title": m.title, "labels": m.labels}))
        }
        Err(e) if e.is_not_found() => CommandReply::failure(format!("Memory {id} not found.")),
        Err(e) => CommandReply::failure(format!("Failed to read memory: {}", describe_error(&e))),
    }
}

/// Recent activity feed.
pub async fn timeline(backend: &dyn MemoryBackend, query: &FeedQuery) -> CommandReply {
    match backend.feed_events(query).await {
        Ok(events) if events.is_empty() => CommandReply::success(
            format!("No activity in the last {} days.", query.last_n_days),
            json!({"count": 0}),
        ),
        Ok(events) => {
            let lines: Vec<String> = events
                .iter()
                .map(|e| {
                    let title = if e.title.trim().is_empty() { e.event_type.as_str() } else { e.title.trim() };
                    format!("{}  [{}] {}", e.created_at, e.event_type, preview(title, 120))
                })
                .collect();
            CommandReply::success(lines.join("\n"), json!({"count": events.len()}))
        }
        Err(e) => CommandReply::failure(format!("Failed to read activity: {}", describe_error(&e))),
    }
}

/// Graph neighbours of a memory.
pub async fn connections(backend: &dyn MemoryBackend, id: &str, depth: u32) -> CommandReply {
    let id = id.trim();
    if id.is_empty() {
        return CommandReply::failure("Usage: connections <memory id>");
    }
    match backend.graph_expand(id, depth).await {
        Ok(graph) if graph.neighbors.is_empty() => CommandReply::success(
            format!("No connections found for {id}."),
            json!({"count": 0}),
        ),
        Ok(graph) => {
            let lines: Vec<String> = graph
                .neighbors
                .iter()
                .map(|n| {
                    let label = if n.title.trim().is_empty() { n.id.as_str() } else { n.title.trim() };
                    format!("- [{}] {} ({})", n.node_type, preview(label, 100), n.id)
                })
                .collect();
            CommandReply::success(
                format!("{} connections ({} edges):\n{}", graph.neighbors.len(), graph.edges.len(), lines.join("\n")),
                json!({"count": graph.neighbors.len(), "edges": graph.edges.len()}),
            )
        }
        Err(e) if e.is_not_found() => CommandReply::failure(format!("Memory {id} not found.")),
        Err(e) => CommandReply::failure(format!("Failed to expand graph: {}", describe_error(&e))),
    }
}

/// Print the working-memory briefing.
pub async fn working_memory(backend: &dyn MemoryBackend) -> CommandReply {
    match backend.read_working_memory().await {
        Ok(wm) if !wm.available => CommandReply::success(
            "Working Memory not available. Ensure the memory service is running with Background Intelligence enabled.",
            json!({"available": false}),
        ),
        Ok(wm) => CommandReply::success(wm.content, json!({"available": true})),
        Err(e) => CommandReply::failure(format!("Failed to read Working Memory: {}", describe_error(&e))),
    }
}

/// Replace the working-memory briefing.
pub async fn update_working_memory(backend: &dyn MemoryBackend, content: &str) -> CommandReply {
    let content = content.trim();
    if content.is_empty() {
        return CommandReply::failure("Usage: working-memory --set <text>");
    }
    match backend.write_working_memory(content).await {
        Ok(()) => {
            info!(chars = content.chars().count(), "working memory updated");
            CommandReply::success("Working Memory updated.", json!({"updated": true}))
        }
        Err(e) => CommandReply::failure(format!("Failed to update Working Memory: {}", describe_error(&e))),
    }
}

/// Search stored conversations.
pub async fn thread_search(backend: &dyn MemoryBackend, query: &ThreadQuery) -> CommandReply {
    if query.query.trim().is_empty() {
        return CommandReply::failure("Usage: threads search <query>");
    }
    match backend.search_threads(query).await {
        Ok(found) if found.threads.is_empty() => CommandReply::success(
            format!("No conversations found for \"{}\".", query.query.trim()),
            json!({"threads": [], "totalFound": 0}),
        ),
        Ok(found) => {
            let mut lines = Vec::with_capacity(found.threads.len());
            for (i, t) in found.threads.iter().enumerate() {
                let title = match t.title.trim() {
                    "" => "(untitled thread)",
                    title => title,
                };
                lines.push(format!(
                    "{}. {} [{}] {} messages ({})",
                    i + 1,
                    preview(title, 100),
                    if t.source.is_empty() { "unknown" } else { t.source.as_str() },
                    t.message_count,
                    t.thread_id
                ));
                for m in t.matched_messages.iter().take(3) {
                    lines.push(format!("   {}: {}", m.role, preview(&m.snippet, 400)));
                }
            }
            CommandReply::success(
                lines.join("\n"),
                json!({"threads": found.threads, "totalFound": found.total_found}),
            )
        }
        Err(e) => CommandReply::failure(format!("Thread search failed: {}", describe_error(&e))),
    }
}

/// Show one page of a stored conversation.
pub async fn thread_show(backend: &dyn MemoryBackend, id: &str, offset: usize, limit: usize) -> CommandReply {
    let id = id.trim();
    if id.is_empty() {
        return CommandReply::failure("Usage: threads show <thread id>");
    }
    match backend.fetch_thread(id, offset, limit).await {
        Ok(page) => {
            let has_more = page.has_more(offset);
            let mut text = String::new();
            if !page.title.trim().is_empty() {
                text.push_str(&format!("# {}\n\n", page.title.trim()));
            }
            for m in &page.messages {
                text.push_str(&format!("{}: {}\n", m.role, m.content.trim()));
            }
            text.push_str(&format!(
                "\nmessages {}-{} of {}",
                offset + usize::from(!page.messages.is_empty()),
                offset + page.messages.len(),
                page.message_count
            ));
            if has_more {
                text.push_str(&format!("  (next: --offset {})", offset + page.messages.len()));
            }
            CommandReply::success(
                text,
                json!({
                    "threadId": page.thread_id,
                    "totalMessages": page.message_count,
                    "offset": offset,
                    "returnedMessages": page.messages.len(),
                    "hasMore": has_more,
                }),
            )
        }
        Err(e) if e.is_not_found() => CommandReply::failure(format!("Thread {id} not found.")),
        Err(e) => CommandReply::failure(format!("Failed to read thread: {}", describe_error(&e))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
