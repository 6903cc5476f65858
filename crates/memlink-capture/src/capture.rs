//! Idempotent thread capture.
//!
//! Per thread the only states are "unknown", "appended", and "created".
//! Nothing is persisted locally between attempts: a failed capture leaves
//! the thread unknown and the next lifecycle event simply tries again. The
//! store deduplicates on message external ids and batch keys, so repeating
//! an append is harmless.
//!
//! Append is always tried first. Only an explicit not-found answer leads to
//! creation; any other failure abandons the attempt so an ambiguous error
//! can never produce a second thread.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use memlink_client::{AppendThread, CreateThread, MemoryBackend, ThreadMessage};
use memlink_core::json::{pick, pick_str};
use memlink_core::text::{collapse_whitespace, truncate_chars};

use crate::errors::Result;
use crate::identity::{batch_idempotency_key, external_id, session_key, stable_thread_id};
use crate::normalize::{
    NormalizeOptions, NormalizedMessage, Role, conversation_text, normalize_messages,
};
use crate::transcript::read_transcript;

/// Producer tag sent with created threads.
pub const DEFAULT_SOURCE: &str = "memlink";

/// Upper bound on a derived thread title.
pub const MAX_TITLE_CHARS: usize = 80;

/// Candidate fields for an inline message list, in lookup order.
pub const MESSAGES_FIELDS: &[&str] = &["messages", "conversation/messages", "context/messages"];

/// Candidate fields for a transcript path, in lookup order.
pub const SESSION_FILE_FIELDS: &[&str] =
    &["sessionFile", "session_file", "transcriptPath", "transcript_path"];

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Why a capture was triggered. Part of the batch key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureReason {
    /// An agent turn finished.
    TurnEnded,
    /// The host is about to clear the session.
    BeforeReset,
    /// The host compacted the session history.
    AfterCompaction,
    /// The host is shutting down.
    AppQuit,
    /// Explicit user request.
    Manual,
}

impl CaptureReason {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TurnEnded => "turn_ended",
            Self::BeforeReset => "before_reset",
            Self::AfterCompaction => "after_compaction",
            Self::AppQuit => "app_quit",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for CaptureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the messages of one capture come from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaptureEvent {
    /// Session key the thread id is derived from.
    pub session_key: String,
    /// Messages supplied inline by the host.
    pub messages: Option<Vec<Value>>,
    /// Transcript to read when no inline messages are given.
    pub session_file: Option<PathBuf>,
}

impl CaptureEvent {
    /// Read a capture event out of a host payload.
    pub fn from_payload(payload: &Value) -> Self {
        Self {
            session_key: session_key(payload),
            messages: pick(payload, MESSAGES_FIELDS)
                .and_then(Value::as_array)
                .cloned(),
            session_file: pick_str(payload, SESSION_FILE_FIELDS).map(PathBuf::from),
        }
    }

    /// Event carrying inline messages.
    pub fn with_messages(session_key: impl Into<String>, messages: Vec<Value>) -> Self {
        Self {
            session_key: session_key.into(),
            messages: Some(messages),
            session_file: None,
        }
    }

    /// Event pointing at a transcript file.
    pub fn from_session_file(session_key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            session_key: session_key.into(),
            messages: None,
            session_file: Some(path.into()),
        }
    }
}

/// How a successful capture reached the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadState {
    /// Appended to an existing thread.
    Appended,
    /// The thread did not exist and was created.
    Created,
}

/// Result of a successful capture.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CaptureOutcome {
    /// Derived thread id.
    pub thread_id: String,
    /// Session key the id was derived from.
    pub session_key: String,
    /// Append or create.
    pub state: ThreadState,
    /// Messages the store actually persisted.
    pub messages_added: usize,
    /// The normalized batch that was sent.
    pub normalized: Vec<NormalizedMessage>,
}

impl CaptureOutcome {
    /// Conversation text of the batch for triage, bounded to `max_chars`.
    pub fn conversation_text(&self, max_chars: usize) -> String {
        conversation_text(&self.normalized, max_chars)
    }
}

/// A batch ready to send: ids derived, title chosen.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedBatch {
    /// Derived thread id.
    pub thread_id: String,
    /// Title used if the thread has to be created.
    pub title: String,
    /// Messages with external ids.
    pub messages: Vec<ThreadMessage>,
    /// Batch key.
    pub idempotency_key: String,
}

/// Thread title: first user message on one line, else `Session <key>`.
pub fn thread_title(session_key: &str, messages: &[NormalizedMessage]) -> String {
    messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| collapse_whitespace(&m.full_text))
        .filter(|t| !t.is_empty())
        .map_or_else(
            || format!("Session {session_key}"),
            |t| truncate_chars(&t, MAX_TITLE_CHARS).to_string(),
        )
}

/// Derive ids and the batch key for a normalized batch.
pub fn prepare_batch(
    session_key: &str,
    normalized: &[NormalizedMessage],
    reason: CaptureReason,
) -> PreparedBatch {
    let thread_id = stable_thread_id(session_key);
    let messages: Vec<ThreadMessage> = normalized
        .iter()
        .enumerate()
        .map(|(index, m)| ThreadMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
            timestamp: m.timestamp.clone(),
            external_id: external_id(&thread_id, session_key, index, m),
        })
        .collect();
    let ids: Vec<String> = messages.iter().map(|m| m.external_id.clone()).collect();
    PreparedBatch {
        idempotency_key: batch_idempotency_key(&thread_id, reason.as_str(), &ids),
        title: thread_title(session_key, normalized),
        thread_id,
        messages,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ThreadCapture
// ─────────────────────────────────────────────────────────────────────────────

/// Appends session messages to their thread, creating it on first sight.
pub struct ThreadCapture {
    backend: Arc<dyn MemoryBackend>,
    options: NormalizeOptions,
    source: String,
}

impl ThreadCapture {
    /// Capture against `backend` with default limits and source tag.
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self {
            backend,
            options: NormalizeOptions::default(),
            source: DEFAULT_SOURCE.to_string(),
        }
    }

    /// Override the producer tag sent on create.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Override normalization limits.
    #[must_use]
    pub fn with_options(mut self, options: NormalizeOptions) -> Self {
        self.options = options;
        self
    }

    async fn raw_messages(&self, event: &CaptureEvent) -> Result<Vec<Value>> {
        if let Some(messages) = event.messages.as_ref().filter(|m| !m.is_empty()) {
            return Ok(messages.clone());
        }
        match &event.session_file {
            Some(path) => read_transcript(path).await,
            None => Ok(Vec::new()),
        }
    }

    /// Append-or-create, returning errors instead of logging them.
    ///
    /// `Ok(None)` means there was nothing to capture.
    pub async fn try_append_or_create(
        &self,
        event: &CaptureEvent,
        reason: CaptureReason,
    ) -> Result<Option<CaptureOutcome>> {
        let raw = self.raw_messages(event).await?;
        let normalized = normalize_messages(&raw, &self.options);
        if normalized.is_empty() {
            debug!(session = %event.session_key, %reason, raw = raw.len(), "nothing to capture");
            return Ok(None);
        }

        let batch = prepare_batch(&event.session_key, &normalized, reason);
        let append = AppendThread {
            thread_id: batch.thread_id.clone(),
            messages: batch.messages.clone(),
            idempotency_key: batch.idempotency_key.clone(),
        };

        let (state, messages_added) = match self.backend.append_thread(&append).await {
            Ok(result) => (ThreadState::Appended, result.messages_added),
            Err(e) if e.is_not_found() => {
                debug!(thread_id = %batch.thread_id, "thread not found, creating");
                let create = CreateThread {
                    thread_id: batch.thread_id.clone(),
                    title: batch.title,
                    messages: batch.messages,
                    source: self.source.clone(),
                };
                let count = create.messages.len();
                let _ = self.backend.create_thread(&create).await?;
                (ThreadState::Created, count)
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            thread_id = %batch.thread_id,
            %reason,
            ?state,
            messages = normalized.len(),
            messages_added,
            "thread captured"
        );
        Ok(Some(CaptureOutcome {
            thread_id: batch.thread_id,
            session_key: event.session_key.clone(),
            state,
            messages_added,
            normalized,
        }))
    }

    /// Append-or-create. Failures are logged and yield `None`.
    pub async fn append_or_create(
        &self,
        event: &CaptureEvent,
        reason: CaptureReason,
    ) -> Option<CaptureOutcome> {
        match self.try_append_or_create(event, reason).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(session = %event.session_key, %reason, error = %e, "thread capture failed");
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
