//! Request and response types for the memory backend.
//!
//! The CLI and HTTP API disagree on response shapes (and both have changed
//! over time), so every `from_value` here reads through an ordered list of
//! candidate fields instead of relying on a single serde layout.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use memlink_core::json::{pick, scalar_string};

/// Default importance when the backend reports none.
pub const DEFAULT_IMPORTANCE: f64 = 0.5;

// ─────────────────────────────────────────────────────────────────────────────
// Field helpers
// ─────────────────────────────────────────────────────────────────────────────

fn pick_string(value: &Value, paths: &[&str]) -> String {
    pick(value, paths).and_then(scalar_string).unwrap_or_default()
}

fn pick_f64(value: &Value, paths: &[&str]) -> Option<f64> {
    pick(value, paths).and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    })
}

fn pick_count(value: &Value, paths: &[&str]) -> usize {
    pick(value, paths)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0)
}

fn pick_labels(value: &Value, paths: &[&str]) -> Vec<String> {
    pick(value, paths)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(scalar_string).collect())
        .unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Memories
// ─────────────────────────────────────────────────────────────────────────────

/// One search hit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Memory id.
    pub id: String,
    /// Title (may be empty).
    pub title: String,
    /// Body text.
    pub content: String,
    /// Relevance score in `[0, 1]`.
    pub score: f64,
    /// Labels attached to the memory.
    pub labels: Vec<String>,
    /// Importance in `[0, 1]`.
    pub importance: f64,
}

impl SearchResult {
    /// Read one hit from either a flat record or `{memory: {...}, similarity_score}`.
    pub fn from_value(v: &Value) -> Self {
        Self {
            id: pick_string(v, &["id", "memory/id", "memory_id"]),
            title: pick_string(v, &["title", "memory/title"]),
            content: pick_string(v, &["content", "memory/content", "snippet"]),
            score: pick_f64(v, &["score", "similarity_score", "relevance"]).unwrap_or(0.0),
            labels: pick_labels(v, &["labels", "memory/labels"]),
            importance: pick_f64(
                v,
                &["importance", "rating", "memory/importance", "memory/rating"],
            )
            .unwrap_or(DEFAULT_IMPORTANCE),
        }
    }

    /// Title when present, otherwise the id.
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() { &self.id } else { &self.title }
    }
}

/// Read the hit list out of a search response (`memories` or `results`, or a bare array).
pub fn parse_search_results(data: &Value) -> Vec<SearchResult> {
    let list = if data.is_array() {
        Some(data)
    } else {
        pick(data, &["memories", "results", "data/memories"])
    };
    list.and_then(Value::as_array)
        .map(|arr| arr.iter().map(SearchResult::from_value).collect())
        .unwrap_or_default()
}

/// A full memory record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// Memory id.
    pub id: String,
    /// Title (may be empty).
    pub title: String,
    /// Body text.
    pub content: String,
    /// Labels.
    pub labels: Vec<String>,
    /// Importance in `[0, 1]`.
    pub importance: f64,
    /// Creation timestamp as reported by the backend.
    pub created_at: Option<String>,
}

impl Memory {
    /// Read a memory from `{...}` or `{memory: {...}}`.
    pub fn from_value(v: &Value) -> Self {
        let inner = v.get("memory").filter(|m| m.is_object()).unwrap_or(v);
        Self {
            id: pick_string(inner, &["id", "memory_id"]),
            title: pick_string(inner, &["title"]),
            content: pick_string(inner, &["content"]),
            labels: pick_labels(inner, &["labels"]),
            importance: pick_f64(inner, &["importance", "rating"]).unwrap_or(DEFAULT_IMPORTANCE),
            created_at: pick(inner, &["created_at", "createdAt"]).and_then(scalar_string),
        }
    }
}

/// Input for saving a memory.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NewMemory {
    /// Body text (required, non-empty).
    pub content: String,
    /// Optional title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Optional importance in `[0, 1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,
    /// Labels.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// Knowledge unit type (`fact`, `decision`, ...). Older backends reject it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_type: Option<String>,
}

/// Id of a newly saved memory (`"created"` when the backend omits it).
pub fn parse_created_id(data: &Value) -> String {
    pick(data, &["id", "memory/id", "memory_id"])
        .and_then(scalar_string)
        .unwrap_or_else(|| "created".to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Threads
// ─────────────────────────────────────────────────────────────────────────────

/// A message as sent to the thread store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    /// `user`, `assistant`, or `system`.
    pub role: String,
    /// Message text.
    pub content: String,
    /// Upstream timestamp (string or epoch number), passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    /// Stable per-message id used by the store for deduplication.
    pub external_id: String,
}

/// Input for creating a thread.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CreateThread {
    /// Stable thread id.
    pub thread_id: String,
    /// Human-readable title.
    pub title: String,
    /// Initial messages.
    pub messages: Vec<ThreadMessage>,
    /// Producer tag (`memlink`, a host name, ...).
    pub source: String,
}

/// Input for appending to a thread.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppendThread {
    /// Stable thread id.
    pub thread_id: String,
    /// Messages to append; the store skips ones whose `external_id` it has seen.
    pub messages: Vec<ThreadMessage>,
    /// Batch key; re-sending the same key is a no-op at the store.
    pub idempotency_key: String,
}

/// Result of an append.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendResult {
    /// Messages actually persisted (duplicates excluded).
    pub messages_added: usize,
}

impl AppendResult {
    /// Read `messages_added` (or `added`/`messagesAdded`).
    pub fn from_value(v: &Value) -> Self {
        let added = pick(v, &["messages_added", "messagesAdded", "added"])
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0);
        Self { messages_added: added }
    }
}

/// Filters for a thread search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadQuery {
    /// Keywords or a natural-language query.
    pub query: String,
    /// Maximum threads, clamped to `[1, 20]`.
    pub limit: usize,
    /// Only threads from this source (`memlink`, `claude-code`, ...).
    pub source: Option<String>,
}

/// A message excerpt that matched a thread search.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedMessage {
    /// Message role.
    pub role: String,
    /// Matching excerpt.
    pub snippet: String,
}

/// One thread hit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    /// Thread id.
    pub thread_id: String,
    /// Title (may be empty).
    pub title: String,
    /// Producer tag.
    pub source: String,
    /// Total messages stored in the thread.
    pub message_count: usize,
    /// Last activity timestamp as reported by the backend.
    pub last_activity: Option<String>,
    /// Relevance score.
    pub relevance_score: f64,
    /// Up to a few matching excerpts.
    pub matched_messages: Vec<MatchedMessage>,
}

impl ThreadSummary {
    /// Read one thread hit.
    pub fn from_value(v: &Value) -> Self {
        let matched_messages = pick(v, &["matched_messages", "matchedMessages"])
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .map(|m| MatchedMessage {
                        role: pick_string(m, &["role"]),
                        snippet: pick_string(m, &["snippet", "content"]),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            thread_id: pick_string(v, &["thread_id", "threadId", "id"]),
            title: pick_string(v, &["title"]),
            source: pick_string(v, &["source"]),
            message_count: pick_count(v, &["message_count", "messageCount"]),
            last_activity: pick(v, &["last_activity", "lastActivity", "updated_at"])
                .and_then(scalar_string),
            relevance_score: pick_f64(v, &["relevance_score", "score"]).unwrap_or(0.0),
            matched_messages,
        }
    }
}

/// Thread search response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSearch {
    /// Hits, best first.
    pub threads: Vec<ThreadSummary>,
    /// Total matches on the backend, which may exceed `threads.len()`.
    pub total_found: usize,
}

impl ThreadSearch {
    /// Read `{threads, total_found}` or a bare array.
    pub fn from_value(v: &Value) -> Self {
        let list = if v.is_array() { Some(v) } else { pick(v, &["threads", "results"]) };
        let threads: Vec<ThreadSummary> = list
            .and_then(Value::as_array)
            .map(|arr| arr.iter().map(ThreadSummary::from_value).collect())
            .unwrap_or_default();
        let total_found = pick(v, &["total_found", "totalFound", "total"])
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(threads.len());
        Self { threads, total_found }
    }
}

/// A stored thread message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Message role.
    pub role: String,
    /// Message text.
    pub content: String,
    /// Timestamp as reported by the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// One page of a thread's messages.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadPage {
    /// Thread id.
    pub thread_id: String,
    /// Title.
    pub title: String,
    /// Producer tag.
    pub source: String,
    /// Total messages in the thread.
    pub message_count: usize,
    /// Messages on this page.
    pub messages: Vec<StoredMessage>,
}

impl ThreadPage {
    /// Read `{thread: {...}, messages: [...]}` or a flat thread object.
    pub fn from_value(v: &Value) -> Self {
        let inner = v.get("thread").filter(|t| t.is_object()).unwrap_or(v);
        let messages: Vec<StoredMessage> = pick(v, &["messages", "thread/messages"])
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .map(|m| StoredMessage {
                        role: pick_string(m, &["role"]),
                        content: pick_string(m, &["content", "text"]),
                        timestamp: pick(m, &["timestamp", "created_at"]).and_then(scalar_string),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let message_count = match pick_count(inner, &["message_count", "messageCount", "total_messages"]) {
            0 => messages.len(),
            n => n,
        };
        Self {
            thread_id: pick_string(inner, &["thread_id", "threadId", "id"]),
            title: pick_string(inner, &["title"]),
            source: pick_string(inner, &["source"]),
            message_count,
            messages,
        }
    }

    /// Whether messages remain after a page fetched at `offset`.
    pub fn has_more(&self, offset: usize) -> bool {
        offset + self.messages.len() < self.message_count
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Working memory, triage, distill
// ─────────────────────────────────────────────────────────────────────────────

/// The daily briefing document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingMemory {
    /// Raw markdown.
    pub content: String,
    /// Whether any content exists.
    pub available: bool,
}

impl WorkingMemory {
    /// Build from raw content; blank content is "unavailable".
    pub fn from_content(content: impl Into<String>) -> Self {
        let content = content.into().trim().to_string();
        let available = !content.is_empty();
        Self { content, available }
    }

    /// Read from `{content}` / `{working_memory}` / a bare string.
    pub fn from_value(v: &Value) -> Self {
        if let Some(s) = v.as_str() {
            return Self::from_content(s);
        }
        Self::from_content(pick_string(v, &["content", "working_memory", "text"]))
    }
}

/// Triage verdict.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageVerdict {
    /// Whether the conversation is worth distilling.
    pub should_distill: bool,
    /// Why.
    pub reason: String,
}

impl TriageVerdict {
    /// Read `should_distill`/`shouldDistill` and `reason`.
    pub fn from_value(v: &Value) -> Self {
        Self {
            should_distill: pick(v, &["should_distill", "shouldDistill"])
                .and_then(Value::as_bool)
                .unwrap_or(false),
            reason: pick_string(v, &["reason"]),
        }
    }
}

/// Distillation outcome.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistillResult {
    /// Number of memories the backend extracted.
    pub memories_created: usize,
}

impl DistillResult {
    /// Read `memories_created` or the length of a `memories` array.
    pub fn from_value(v: &Value) -> Self {
        let created = pick(v, &["memories_created", "memoriesCreated", "created"])
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .or_else(|| v.get("memories").and_then(Value::as_array).map(Vec::len))
            .unwrap_or(0);
        Self { memories_created: created }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Feed and graph
// ─────────────────────────────────────────────────────────────────────────────

/// Filters for the activity feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedQuery {
    /// Look-back window in days, clamped to `[1, 365]`.
    pub last_n_days: u32,
    /// Optional event type filter.
    pub event_type: Option<String>,
    /// Only headline events.
    pub tier1_only: bool,
    /// Maximum events.
    pub limit: usize,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self { last_n_days: 7, event_type: None, tier1_only: true, limit: 100 }
    }
}

/// One activity feed event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedEvent {
    /// Event id.
    pub id: String,
    /// Event type (`memory_created`, `thread_saved`, ...).
    pub event_type: String,
    /// Headline.
    pub title: String,
    /// ISO timestamp.
    pub created_at: String,
}

impl FeedEvent {
    /// Read one event.
    pub fn from_value(v: &Value) -> Self {
        Self {
            id: pick_string(v, &["id"]),
            event_type: pick_string(v, &["event_type", "type"]),
            title: pick_string(v, &["title", "summary", "description"]),
            created_at: pick_string(v, &["created_at", "timestamp"]),
        }
    }
}

/// Read an event list from `{events}` or a bare array.
pub fn parse_feed_events(data: &Value) -> Vec<FeedEvent> {
    let list = if data.is_array() { Some(data) } else { pick(data, &["events", "items"]) };
    list.and_then(Value::as_array)
        .map(|arr| arr.iter().map(FeedEvent::from_value).collect())
        .unwrap_or_default()
}

/// A node adjacent to a memory in the knowledge graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphNeighbor {
    /// Node id.
    pub id: String,
    /// Node type (`Memory`, `Entity`, `Source`, ...).
    pub node_type: String,
    /// Label or title.
    pub title: String,
    /// Short excerpt.
    pub snippet: String,
}

/// An edge in the neighborhood of a memory.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Edge type (`EVOLVES`, `SOURCED_FROM`, ...).
    pub edge_type: String,
    /// Relation qualifier (`replaces`, `enriches`, ...).
    pub relation: String,
}

/// Graph neighborhood of one memory.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphNeighborhood {
    /// Adjacent nodes.
    pub neighbors: Vec<GraphNeighbor>,
    /// Edges among them.
    pub edges: Vec<GraphEdge>,
}

impl GraphNeighborhood {
    /// Read `{neighbors, edges}`.
    pub fn from_value(v: &Value) -> Self {
        let neighbors = v
            .get("neighbors")
            .or_else(|| v.get("nodes"))
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .map(|n| GraphNeighbor {
                        id: pick_string(n, &["id"]),
                        node_type: pick_string(n, &["type", "node_type", "label"]),
                        title: pick_string(n, &["title", "name"]),
                        snippet: pick_string(n, &["snippet", "content", "description"]),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let edges = v
            .get("edges")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .map(|e| GraphEdge {
                        edge_type: pick_string(e, &["edge_type", "type"]),
                        relation: pick_string(e, &["relation", "properties/relation"]),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { neighbors, edges }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

/// Backend health as seen by the client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Whether the backend answered at all.
    pub reachable: bool,
    /// Backend version, when reported.
    pub version: Option<String>,
    /// Database connectivity, when reported.
    pub database_connected: Option<bool>,
}

impl HealthStatus {
    /// Read a `/health` body.
    pub fn from_value(v: &Value) -> Self {
        Self {
            reachable: true,
            version: pick(v, &["version"]).and_then(scalar_string),
            database_connected: pick(v, &["database_connected", "databaseConnected"])
                .and_then(Value::as_bool),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn search_reads_memories_or_results() {
        let a = parse_search_results(&json!({"memories": [{"id": "m1", "score": 0.9}]}));
        let b = parse_search_results(&json!({"results": [{"id": "m1", "score": 0.9}]}));
        assert_eq!(a, b);
        assert_eq!(a[0].id, "m1");
    }

    #[test]
    fn search_reads_nested_memory_shape() {
        let hits = parse_search_results(&json!({
            "memories": [{
                "memory": {"id": "m2", "title": "T", "content": "C", "labels": ["x"]},
                "similarity_score": 0.42
            }]
        }));
        assert_eq!(hits[0].id, "m2");
        assert_eq!(hits[0].title, "T");
        assert!((hits[0].score - 0.42).abs() < f64::EPSILON);
        assert_eq!(hits[0].labels, vec!["x".to_string()]);
    }

    #[test]
    fn thread_search_shape() {
        let found = ThreadSearch::from_value(&json!({
            "threads": [{
                "thread_id": "memlink-main-abc",
                "title": "TLS choice",
                "source": "memlink",
                "message_count": 12,
                "relevance_score": 0.7,
                "matched_messages": [{"role": "user", "snippet": "go with rustls"}]
            }],
            "total_found": 4
        }));
        assert_eq!(found.total_found, 4);
        assert_eq!(found.threads[0].thread_id, "memlink-main-abc");
        assert_eq!(found.threads[0].message_count, 12);
        assert_eq!(found.threads[0].matched_messages[0].snippet, "go with rustls");

        let bare = ThreadSearch::from_value(&json!([{"id": "t1"}]));
        assert_eq!(bare.total_found, 1);
        assert_eq!(bare.threads[0].thread_id, "t1");
    }

    #[test]
    fn thread_page_shape_and_paging() {
        let page = ThreadPage::from_value(&json!({
            "thread": {"id": "t1", "title": "T", "source": "memlink", "message_count": 5},
            "messages": [
                {"role": "user", "content": "one"},
                {"role": "assistant", "content": "two", "timestamp": "2026-10-18T09:00:00Z"}
            ]
        }));
        assert_eq!(page.thread_id, "t1");
        assert_eq!(page.messages.len(), 2);
        assert!(page.has_more(0));
        assert!(!page.has_more(3));

        let flat = ThreadPage::from_value(&json!({"id": "t2", "messages": [{"role": "user", "content": "x"}]}));
        assert_eq!(flat.message_count, 1);
        assert!(!flat.has_more(0));
    }

    #[test]
    fn importance_falls_back_to_rating_then_default() {
        let hit = SearchResult::from_value(&json!({"id": "a", "rating": 0.8}));
        assert!((hit.importance - 0.8).abs() < f64::EPSILON);
        let hit = SearchResult::from_value(&json!({"id": "a"}));
        assert!((hit.importance - DEFAULT_IMPORTANCE).abs() < f64::EPSILON);
    }

    #[test]
    fn numeric_ids_are_stringified() {
        let hit = SearchResult::from_value(&json!({"id": 42}));
        assert_eq!(hit.id, "42");
    }

    #[test]
    fn empty_search_payload_is_empty() {
        assert!(parse_search_results(&json!({})).is_empty());
        assert!(parse_search_results(&json!({"memories": null})).is_empty());
    }

    #[test]
    fn display_title_falls_back_to_id() {
        let hit = SearchResult { id: "m9".into(), ..Default::default() };
        assert_eq!(hit.display_title(), "m9");
    }

    #[test]
    fn created_id_default() {
        assert_eq!(parse_created_id(&json!({"id": "abc"})), "abc");
        assert_eq!(parse_created_id(&json!({"ok": true})), "created");
    }

    #[test]
    fn append_result_variants() {
        assert_eq!(AppendResult::from_value(&json!({"messages_added": 3})).messages_added, 3);
        assert_eq!(AppendResult::from_value(&json!({"messagesAdded": 2})).messages_added, 2);
        assert_eq!(AppendResult::from_value(&json!({})).messages_added, 0);
    }

    #[test]
    fn working_memory_blank_is_unavailable() {
        let wm = WorkingMemory::from_value(&json!({"content": "   "}));
        assert!(!wm.available);
        let wm = WorkingMemory::from_value(&json!("# Today\n- ship it"));
        assert!(wm.available);
    }

    #[test]
    fn triage_verdict_reads_both_casings() {
        let v = TriageVerdict::from_value(&json!({"shouldDistill": true, "reason": "decisions made"}));
        assert!(v.should_distill);
        assert_eq!(v.reason, "decisions made");
    }

    #[test]
    fn distill_counts_memories_array() {
        let r = DistillResult::from_value(&json!({"memories": [{}, {}]}));
        assert_eq!(r.memories_created, 2);
    }

    #[test]
    fn memory_from_wrapped_shape() {
        let m = Memory::from_value(&json!({"memory": {"id": "m1", "content": "hi", "created_at": "2026-01-02"}}));
        assert_eq!(m.id, "m1");
        assert_eq!(m.created_at.as_deref(), Some("2026-01-02"));
    }

    #[test]
    fn graph_neighborhood_parses() {
        let g = GraphNeighborhood::from_value(&json!({
            "neighbors": [{"id": "e1", "type": "Entity", "title": "Rust"}],
            "edges": [{"edge_type": "EVOLVES", "relation": "replaces"}]
        }));
        assert_eq!(g.neighbors[0].node_type, "Entity");
        assert_eq!(g.edges[0].relation, "replaces");
    }

    #[test]
    fn feed_events_from_object_or_array() {
        let a = parse_feed_events(&json!({"events": [{"id": "1", "event_type": "memory_created"}]}));
        let b = parse_feed_events(&json!([{"id": "1", "type": "memory_created"}]));
        assert_eq!(a, b);
    }

    #[test]
    fn health_reads_fields() {
        let h = HealthStatus::from_value(&json!({"version": "0.6.1", "database_connected": true}));
        assert!(h.reachable);
        assert_eq!(h.version.as_deref(), Some("0.6.1"));
        assert_eq!(h.database_connected, Some(true));
    }
}
