//! Recall gating and context fetch.

use futures::join;
use serde::Serialize;
use tracing::{debug, warn};

use memlink_client::{MemoryBackend, SearchResult, WorkingMemory};
use memlink_core::text::truncate_chars;
use memlink_settings::{RecallFrequency, ResolvedConfig};

use crate::state::SessionState;

/// Outgoing text shorter than this (in characters, trimmed) is not worth a
/// recall round-trip.
pub const MIN_RECALL_CHARS: usize = 8;

/// Longest query sent to search.
pub const MAX_QUERY_CHARS: usize = 1000;

/// Why recall did not inject anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallSkip {
    /// `sessionContext` is off.
    Disabled,
    /// Outgoing text below [`MIN_RECALL_CHARS`].
    TooShort,
    /// `thread_once` mode and this thread already got context.
    AlreadyRecalled,
    /// No working memory and no search hits.
    NothingFound,
    /// The payload has no field the rewritten text can go into.
    NotWritable,
}

/// Result of a recall attempt.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecallOutcome {
    /// Nothing was injected.
    Skipped {
        /// Why.
        reason: RecallSkip,
    },
    /// A context block was prepended.
    Injected {
        /// Thread the block was injected into.
        thread_id: String,
        /// Size of the block in characters.
        chars: usize,
        /// Search hits included.
        results: usize,
    },
}

impl RecallOutcome {
    pub(crate) fn skipped(reason: RecallSkip) -> Self {
        Self::Skipped { reason }
    }
}

/// Decide whether recall should run for `thread_id`.
pub fn recall_gate(
    config: &ResolvedConfig,
    state: &SessionState,
    thread_id: &str,
    content: &str,
) -> Result<(), RecallSkip> {
    if !config.session_context {
        return Err(RecallSkip::Disabled);
    }
    if content.trim().chars().count() < MIN_RECALL_CHARS {
        return Err(RecallSkip::TooShort);
    }
    if config.recall_frequency == RecallFrequency::ThreadOnce && state.was_recalled(thread_id) {
        return Err(RecallSkip::AlreadyRecalled);
    }
    Ok(())
}

/// Working memory and search hits for one turn.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecalledContext {
    /// Working-memory briefing, when the read succeeded.
    pub working_memory: Option<WorkingMemory>,
    /// Search hits for the outgoing text.
    pub results: Vec<SearchResult>,
}

/// Read working memory and search concurrently. Either failure is logged
/// and treated as empty.
pub async fn fetch_recall_context(
    backend: &dyn MemoryBackend,
    query: &str,
    limit: usize,
) -> RecalledContext {
    let query = truncate_chars(query.trim(), MAX_QUERY_CHARS);
    let (wm, hits) = join!(backend.read_working_memory(), backend.search(query, limit));

    let working_memory = wm
        .map_err(|e| warn!(error = %e, kind = %e.kind(), "recall: working memory read failed"))
        .ok();
    let results = hits
        .map_err(|e| warn!(error = %e, kind = %e.kind(), "recall: search failed"))
        .unwrap_or_default();

    debug!(
        working_memory = working_memory.as_ref().is_some_and(|w| w.available),
        results = results.len(),
        "recall context fetched"
    );
    RecalledContext { working_memory, results }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config(session_context: bool, freq: RecallFrequency) -> ResolvedConfig {
        ResolvedConfig {
            session_context,
            recall_frequency: freq,
            ..ResolvedConfig::default()
        }
    }

    #[test]
    fn disabled_and_short_prompts_skip() {
        let state = SessionState::new();
        assert_eq!(
            recall_gate(&config(false, RecallFrequency::EveryMessage), &state, "t", "long enough prompt"),
            Err(RecallSkip::Disabled)
        );
        assert_eq!(
            recall_gate(&config(true, RecallFrequency::EveryMessage), &state, "t", "  short  "),
            Err(RecallSkip::TooShort)
        );
        assert_eq!(
            recall_gate(&config(true, RecallFrequency::EveryMessage), &state, "t", "eight ch"),
            Ok(())
        );
    }

    #[test]
    fn thread_once_respects_recalled_set() {
        let state = SessionState::new();
        let cfg = config(true, RecallFrequency::ThreadOnce);
        assert_eq!(recall_gate(&cfg, &state, "t", "what did we decide"), Ok(()));
        let _ = state.claim_recall("t");
        assert_eq!(
            recall_gate(&cfg, &state, "t", "what did we decide"),
            Err(RecallSkip::AlreadyRecalled)
        );
        assert_eq!(recall_gate(&cfg, &state, "other", "what did we decide"), Ok(()));

        let every = config(true, RecallFrequency::EveryMessage);
        assert_eq!(recall_gate(&every, &state, "t", "what did we decide"), Ok(()));
    }
}
