//! Digest gating: when a captured turn is worth triage and distillation.
//!
//! Append is cheap and idempotent and runs on every digest event. Triage is
//! an LLM call, so it runs only when the append actually added messages, the
//! conversation is large enough, and the thread is outside its cooldown.
//! The caller claims the cooldown with
//! [`SessionState::try_begin_triage`] after this gate passes, right before
//! triage, so a turn rejected for any other reason never consumes it.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use memlink_capture::{CaptureOutcome, ThreadState};
use memlink_client::MemoryBackend;

use crate::state::SessionState;

/// Minimum messages in the batch before triage.
pub const MIN_TRIAGE_MESSAGES: usize = 4;

/// Minimum rendered conversation length (characters) before triage.
pub const MIN_TRIAGE_CHARS: usize = 100;

/// Conversation text sent to triage and distillation is bounded to this.
pub const MAX_CONVERSATION_CHARS: usize = 16_000;

/// Why the whole digest was skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestSkip {
    /// `sessionDigest` is off.
    Disabled,
    /// The host reported the turn as failed.
    TurnFailed,
    /// Nothing to capture, or the capture failed (already logged).
    NothingCaptured,
}

/// Why triage did not run after a successful capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageSkip {
    /// The append added nothing new.
    NoNewMessages,
    /// Fewer than [`MIN_TRIAGE_MESSAGES`] messages.
    TooFewMessages,
    /// Conversation shorter than [`MIN_TRIAGE_CHARS`].
    TooShort,
    /// Triaged within `digestMinInterval`.
    Cooldown,
}

/// What happened after capture.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TriageStep {
    /// Triage was not attempted.
    Skipped {
        /// Why.
        reason: TriageSkip,
    },
    /// Triage ran and said no.
    Declined {
        /// Triage's explanation.
        reason: String,
    },
    /// Triage said yes and distillation ran.
    Distilled {
        /// Triage's explanation.
        reason: String,
        /// Memories the distillation produced.
        memories_created: usize,
    },
    /// Triage or distillation failed; the capture stands.
    Failed {
        /// `triage` or `distill`.
        stage: &'static str,
    },
}

/// Result of one digest event.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DigestOutcome {
    /// Nothing was captured.
    Skipped {
        /// Why.
        reason: DigestSkip,
    },
    /// The batch reached the store.
    Captured {
        /// Thread id.
        thread_id: String,
        /// Append or create.
        state: ThreadState,
        /// Messages the store persisted.
        messages_added: usize,
        /// Triage and distillation result.
        triage: TriageStep,
    },
}

/// Check every triage filter except the cooldown recording itself.
///
/// On success returns the conversation text to triage.
pub fn triage_gate(
    outcome: &CaptureOutcome,
    state: &SessionState,
    now_ms: u64,
    min_interval: Duration,
) -> Result<String, TriageSkip> {
    if outcome.messages_added == 0 {
        return Err(TriageSkip::NoNewMessages);
    }
    if outcome.normalized.len() < MIN_TRIAGE_MESSAGES {
        return Err(TriageSkip::TooFewMessages);
    }
    let text = outcome.conversation_text(MAX_CONVERSATION_CHARS);
    if text.chars().count() < MIN_TRIAGE_CHARS {
        return Err(TriageSkip::TooShort);
    }
    if state.in_cooldown(&outcome.thread_id, now_ms, min_interval) {
        return Err(TriageSkip::Cooldown);
    }
    Ok(text)
}

/// Triage, then distill when triage says so. Failures are logged and
/// reported as [`TriageStep::Failed`].
pub async fn triage_and_distill(
    backend: &dyn MemoryBackend,
    thread_id: &str,
    conversation: &str,
) -> TriageStep {
    let verdict = match backend.triage_conversation(conversation).await {
        Ok(v) => v,
        Err(e) => {
            warn!(thread_id, error = %e, kind = %e.kind(), "triage failed");
            return TriageStep::Failed { stage: "triage" };
        }
    };

    if !verdict.should_distill {
        info!(thread_id, reason = %verdict.reason, "triage declined");
        return TriageStep::Declined { reason: verdict.reason };
    }

    match backend.distill_thread(thread_id, conversation).await {
        Ok(result) => {
            info!(
                thread_id,
                reason = %verdict.reason,
                memories_created = result.memories_created,
                "thread distilled"
            );
            TriageStep::Distilled {
                reason: verdict.reason,
                memories_created: result.memories_created,
            }
        }
        Err(e) => {
            warn!(thread_id, error = %e, kind = %e.kind(), "distill failed");
            TriageStep::Failed { stage: "distill" }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
