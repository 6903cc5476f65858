//! Before-turn payload access.
//!
//! Hosts send either `{input, output}` (input is the message being sent,
//! output is where a rewritten message goes) or a bare message object.
//! [`TurnPayload`] reads the thread key and outgoing text from either shape
//! and writes the rewritten text back where the host will pick it up.

use serde_json::{Map, Value};

use memlink_capture::extract_text;
use memlink_capture::identity::{DEFAULT_SESSION_KEY, SESSION_KEY_FIELDS};
use memlink_core::json::{pick, pick_str};

/// Candidate fields for the outgoing text of the input message, in lookup order.
pub const TEXT_FIELDS: &[&str] = &["message/content", "content", "prompt", "text"];

/// Writable text fields of a bare message, in lookup order.
const WRITABLE_TEXT_FIELDS: &[&str] = &["content", "prompt", "text"];

/// A before-turn payload.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnPayload {
    root: Value,
}

impl TurnPayload {
    /// Wrap a raw payload.
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    fn is_wrapped(&self) -> bool {
        self.root
            .as_object()
            .is_some_and(|o| o.contains_key("input") || o.contains_key("output"))
    }

    fn input(&self) -> &Value {
        match self.root.get("input") {
            Some(input) if self.is_wrapped() => input,
            _ => &self.root,
        }
    }

    /// Thread key from the input, then the wrapper, else the default key.
    ///
    /// Uses the same candidate table as capture, so recall and digest agree
    /// on which conversation a payload belongs to.
    pub fn thread_key(&self) -> String {
        pick_str(self.input(), SESSION_KEY_FIELDS)
            .or_else(|| pick_str(&self.root, SESSION_KEY_FIELDS))
            .unwrap_or_else(|| DEFAULT_SESSION_KEY.to_string())
    }

    /// Outgoing text.
    ///
    /// Wrapped payloads prefer an already-rewritten `output.content`, then
    /// the input message.
    pub fn content(&self) -> String {
        let rewritten = self
            .root
            .pointer("/output/content")
            .and_then(Value::as_str)
            .filter(|text| self.is_wrapped() && !text.is_empty());
        if let Some(text) = rewritten {
            return text.to_string();
        }
        let input = self.input();
        TEXT_FIELDS
            .iter()
            .filter_map(|path| pick(input, &[*path]))
            .map(extract_text)
            .find(|text| !text.is_empty())
            .unwrap_or_default()
    }

    /// Replace the outgoing text. Returns `false` when the payload has no
    /// writable text field, in which case nothing changes.
    pub fn set_content(&mut self, next: String) -> bool {
        if self.is_wrapped() {
            return match self.root.get_mut("output") {
                Some(Value::Object(output)) => {
                    let _ = output.insert("content".into(), Value::String(next));
                    true
                }
                _ => false,
            };
        }
        let Some(obj) = self.root.as_object_mut() else {
            return false;
        };
        write_first_string_field(obj, next)
    }

    /// The (possibly rewritten) payload.
    pub fn into_value(self) -> Value {
        self.root
    }

    /// Borrow the payload.
    pub fn as_value(&self) -> &Value {
        &self.root
    }
}

fn write_first_string_field(obj: &mut Map<String, Value>, next: String) -> bool {
    let Some(field) = WRITABLE_TEXT_FIELDS
        .iter()
        .find(|f| obj.get(**f).is_some_and(Value::is_string))
    else {
        return false;
    };
    let _ = obj.insert((*field).to_string(), Value::String(next));
    true
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
