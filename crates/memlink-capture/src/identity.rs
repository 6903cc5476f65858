//! Thread, message, and batch identity.
//!
//! Every id here is a pure function of its inputs. Re-running capture over
//! the same session therefore produces the same thread id, the same message
//! external ids, and the same batch key, which is what lets the store drop
//! duplicates.

use serde_json::Value;

use memlink_core::json::pick_str;
use memlink_core::text::{slugify, truncate_chars};
use memlink_core::{sha256_hex, sha256_hex_parts};

use crate::normalize::NormalizedMessage;

/// Prefix of every derived thread id.
pub const THREAD_PREFIX: &str = "memlink";

/// Upper bound on a thread id.
pub const MAX_THREAD_ID_LEN: usize = 80;

/// Upper bound on the slug part of a thread id.
pub const MAX_SLUG_LEN: usize = 40;

/// Upper bound on a sanitized upstream message id.
pub const MAX_EXTERNAL_HINT_LEN: usize = 96;

/// Session key used when the event names none.
pub const DEFAULT_SESSION_KEY: &str = "default";

/// Candidate fields for the session key, in lookup order.
pub const SESSION_KEY_FIELDS: &[&str] = &[
    "sessionKey",
    "sessionId",
    "session_id",
    "threadId",
    "thread/id",
    "conversationId",
    "chatId",
];

/// Session key of a host event, falling back to [`DEFAULT_SESSION_KEY`].
pub fn session_key(event: &Value) -> String {
    pick_str(event, SESSION_KEY_FIELDS).unwrap_or_else(|| DEFAULT_SESSION_KEY.to_string())
}

/// Stable thread id for a session key: `memlink-<slug>-<hash12>`.
pub fn stable_thread_id(session_key: &str) -> String {
    let base = match session_key.trim() {
        "" => DEFAULT_SESSION_KEY,
        trimmed => trimmed,
    };
    let slug = match slugify(base, MAX_SLUG_LEN) {
        s if s.is_empty() => "session".to_string(),
        s => s,
    };
    let digest = sha256_hex(base);
    let id = format!("{THREAD_PREFIX}-{slug}-{}", &digest[..12]);
    truncate_chars(&id, MAX_THREAD_ID_LEN).to_string()
}

fn sanitize_hint(hint: &str) -> String {
    let cleaned: String = hint
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'))
        .collect();
    truncate_chars(&cleaned, MAX_EXTERNAL_HINT_LEN).to_string()
}

/// External id of the message at `index` in a batch.
///
/// Uses the upstream id when it survives sanitizing, otherwise a hash of
/// thread, session, position, role, and content.
pub fn external_id(
    thread_id: &str,
    session_key: &str,
    index: usize,
    message: &NormalizedMessage,
) -> String {
    if let Some(hint) = message.external_hint.as_deref() {
        let hint = sanitize_hint(hint);
        if !hint.is_empty() {
            return hint;
        }
    }
    let index = index.to_string();
    let digest = sha256_hex_parts(&[
        thread_id,
        session_key,
        index.as_str(),
        message.role.as_str(),
        message.content.as_str(),
    ]);
    format!("msg-{}", &digest[..32])
}

/// Batch idempotency key over thread, reason, count, and external ids.
pub fn batch_idempotency_key(thread_id: &str, reason: &str, external_ids: &[String]) -> String {
    let count = external_ids.len().to_string();
    let mut parts: Vec<&str> = Vec::with_capacity(external_ids.len() + 3);
    parts.extend([thread_id, reason, count.as_str()]);
    parts.extend(external_ids.iter().map(String::as_str));
    let digest = sha256_hex_parts(&parts);
    format!("batch-{}", &digest[..32])
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
