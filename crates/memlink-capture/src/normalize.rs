//! Message normalization.
//!
//! Hosts hand us messages in many shapes: bare `{role, content}`, transcript
//! records wrapped as `{type: "message", message: {...}}`, content as a plain
//! string or as a list of typed blocks. Everything is reduced to
//! [`NormalizedMessage`] here, in input order, before ids are derived.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use memlink_core::json::{pick, pick_str};
use memlink_core::text::{truncate_chars, truncate_with_suffix};

/// Stored content limit, in characters.
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 800;

/// Limit for the untruncated text kept for triage.
pub const DEFAULT_MAX_FULL_TEXT_CHARS: usize = 4000;

/// Marker appended to truncated content.
pub const ELLIPSIS: &str = "...";

/// Candidate fields for the role, in lookup order.
pub const ROLE_FIELDS: &[&str] = &["role", "author/role", "sender"];

/// Candidate fields for the content, in lookup order.
pub const CONTENT_FIELDS: &[&str] = &["content", "text", "message/content", "body"];

/// Candidate fields for the timestamp, in lookup order.
pub const TIMESTAMP_FIELDS: &[&str] = &["timestamp", "created_at", "createdAt", "ts", "time"];

/// Candidate fields for an upstream message id, in lookup order.
pub const ID_HINT_FIELDS: &[&str] = &["id", "messageId", "message_id", "uuid"];

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Conversation role kept by the normalizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human turn.
    User,
    /// Model turn.
    Assistant,
    /// System prompt or host notice.
    System,
}

impl Role {
    /// Parse a role name (case-insensitive). Anything else is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits applied during normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Max characters of `content` before the ellipsis.
    pub max_content_chars: usize,
    /// Max characters of `full_text`.
    pub max_full_text_chars: usize,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_content_chars: DEFAULT_MAX_CONTENT_CHARS,
            max_full_text_chars: DEFAULT_MAX_FULL_TEXT_CHARS,
        }
    }
}

/// A message in canonical form.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NormalizedMessage {
    /// Role.
    pub role: Role,
    /// Trimmed text, truncated to `max_content_chars` plus [`ELLIPSIS`].
    pub content: String,
    /// Trimmed text up to `max_full_text_chars`, never suffixed.
    pub full_text: String,
    /// Upstream timestamp, passed through as-is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    /// Upstream message id, unsanitized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_hint: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction
// ─────────────────────────────────────────────────────────────────────────────

fn block_text(block: &Value) -> Option<&str> {
    match block {
        Value::String(s) => Some(s),
        Value::Object(obj) => {
            let typed_text = obj
                .get("type")
                .and_then(Value::as_str)
                .is_none_or(|t| t == "text");
            if typed_text { obj.get("text").and_then(Value::as_str) } else { None }
        }
        _ => None,
    }
}

/// Plain text of a content value.
///
/// Strings pass through. Arrays keep only `text` blocks (and bare strings),
/// joined by newlines. Objects yield their `text` field. Anything else is
/// empty.
pub fn extract_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(block_text)
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(_) => block_text(content).unwrap_or_default().to_string(),
        _ => String::new(),
    }
}

/// Unwrap a `{type: "message", message: {...}}` transcript record.
pub fn unwrap_record(record: &Value) -> &Value {
    let wrapped = record.get("type").and_then(Value::as_str) == Some("message");
    match record.get("message") {
        Some(inner) if wrapped && inner.is_object() => inner,
        _ => record,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Normalization
// ─────────────────────────────────────────────────────────────────────────────

/// Normalize one raw message. `None` means the message is dropped.
pub fn normalize_message(raw: &Value, opts: &NormalizeOptions) -> Option<NormalizedMessage> {
    let msg = unwrap_record(raw);
    let role = pick(msg, ROLE_FIELDS).and_then(Value::as_str).and_then(Role::parse)?;

    let text = pick(msg, CONTENT_FIELDS).map(extract_text).unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if role == Role::User && text.starts_with('/') {
        return None;
    }

    Some(NormalizedMessage {
        role,
        content: truncate_with_suffix(text, opts.max_content_chars, ELLIPSIS),
        full_text: truncate_chars(text, opts.max_full_text_chars).to_string(),
        timestamp: pick(msg, TIMESTAMP_FIELDS).cloned(),
        external_hint: pick_str(msg, ID_HINT_FIELDS),
    })
}

/// Normalize a batch, preserving order.
pub fn normalize_messages(raw: &[Value], opts: &NormalizeOptions) -> Vec<NormalizedMessage> {
    raw.iter().filter_map(|m| normalize_message(m, opts)).collect()
}

/// Render messages as `role: text` paragraphs for triage and distillation,
/// bounded to `max_chars`.
pub fn conversation_text(messages: &[NormalizedMessage], max_chars: usize) -> String {
    let rendered = messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.full_text))
        .collect::<Vec<_>>()
        .join("\n\n");
    truncate_chars(&rendered, max_chars).to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn norm(raw: &[Value]) -> Vec<NormalizedMessage> {
        normalize_messages(raw, &NormalizeOptions::default())
    }

    #[test]
    fn string_content() {
        let out = norm(&[json!({"role": "user", "content": "hello there"})]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].role, Role::User);
        assert_eq!(out[0].content, "hello there");
    }

    #[test]
    fn only_text_blocks_are_extracted() {
        let out = norm(&[json!({
            "role": "assistant",
            "content": [
                {"type": "text", "text": "first"},
                {"type": "tool_use", "name": "bash", "input": {}},
                {"type": "image", "text": "ignored"},
                {"type": "text", "text": "second"}
            ]
        })]);
        assert_eq!(out[0].content, "first\nsecond");
    }

    #[test]
    fn wrapped_transcript_record_is_unwrapped() {
        let out = norm(&[json!({
            "type": "message",
            "message": {"role": "user", "content": "wrapped", "id": "m-1"}
        })]);
        assert_eq!(out[0].content, "wrapped");
        assert_eq!(out[0].external_hint.as_deref(), Some("m-1"));
    }

    #[test]
    fn unknown_roles_dropped() {
        let out = norm(&[
            json!({"role": "tool", "content": "x"}),
            json!({"role": "function", "content": "y"}),
            json!({"content": "no role"}),
            json!({"role": "system", "content": "kept"}),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].role, Role::System);
    }

    #[test]
    fn slash_commands_from_user_dropped() {
        let out = norm(&[
            json!({"role": "user", "content": "  /reset"}),
            json!({"role": "assistant", "content": "/path/to/file is fine"}),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].role, Role::Assistant);
    }

    #[test]
    fn empty_messages_dropped() {
        let out = norm(&[
            json!({"role": "user", "content": "   "}),
            json!({"role": "assistant", "content": [{"type": "tool_use"}]}),
            json!({"role": "assistant", "content": null}),
        ]);
        assert!(out.is_empty());
    }

    #[test]
    fn order_preserved_and_no_dedup() {
        let out = norm(&[
            json!({"role": "user", "content": "same"}),
            json!({"role": "assistant", "content": "reply"}),
            json!({"role": "user", "content": "same"}),
        ]);
        let texts: Vec<_> = out.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, ["same", "reply", "same"]);
    }

    #[test]
    fn long_content_truncated_full_text_kept() {
        let long = "a".repeat(1000);
        let out = norm(&[json!({"role": "user", "content": long})]);
        assert_eq!(out[0].content.chars().count(), DEFAULT_MAX_CONTENT_CHARS + ELLIPSIS.len());
        assert!(out[0].content.ends_with(ELLIPSIS));
        assert_eq!(out[0].full_text.chars().count(), 1000);
    }

    #[test]
    fn timestamp_passed_through() {
        let out = norm(&[
            json!({"role": "user", "content": "a", "timestamp": 1_700_000_000_000_u64}),
            json!({"role": "user", "content": "b", "created_at": "2025-01-01T00:00:00Z"}),
        ]);
        assert_eq!(out[0].timestamp, Some(json!(1_700_000_000_000_u64)));
        assert_eq!(out[1].timestamp, Some(json!("2025-01-01T00:00:00Z")));
    }

    #[test]
    fn conversation_text_renders_roles() {
        let out = norm(&[
            json!({"role": "user", "content": "question"}),
            json!({"role": "assistant", "content": "answer"}),
        ]);
        assert_eq!(conversation_text(&out, 1000), "user: question\n\nassistant: answer");
        assert_eq!(conversation_text(&out, 4), "user");
    }

    proptest! {
        #[test]
        fn content_never_exceeds_limit(text in "\\PC{0,1200}", max in 1usize..900) {
            let opts = NormalizeOptions { max_content_chars: max, ..NormalizeOptions::default() };
            if let Some(m) = normalize_message(&json!({"role": "assistant", "content": text}), &opts) {
                prop_assert!(m.content.chars().count() <= max + ELLIPSIS.len());
                prop_assert!(!m.content.is_empty());
            }
        }
    }
}
