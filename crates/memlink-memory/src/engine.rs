//! Policy engine.
//!
//! One engine per host plugin instance. It owns the resolved config, the
//! session state, and the capture pipeline, and turns each
//! [`LifecycleEvent`] into at most one recall or one digest.
//!
//! Nothing here fails the host's turn: every transport error is logged and
//! reported in the outcome.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use memlink_capture::{CaptureEvent, CaptureReason, ThreadCapture, stable_thread_id};
use memlink_client::MemoryBackend;
use memlink_settings::{RecallFrequency, ResolvedConfig, SettingsError};

use crate::context::{ContextOptions, build_context_block, prepend_context};
use crate::digest::{
    DigestOutcome, DigestSkip, TriageSkip, TriageStep, triage_and_distill, triage_gate,
};
use crate::events::LifecycleEvent;
use crate::payload::TurnPayload;
use crate::recall::{RecallOutcome, RecallSkip, fetch_recall_context, recall_gate};
use crate::state::{Clock, SessionState, SystemClock};

/// Re-resolves configuration from a new host config object.
pub type ConfigReload =
    Arc<dyn Fn(Option<&Value>) -> Result<ResolvedConfig, SettingsError> + Send + Sync>;

/// What the engine did with one event.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EngineOutcome {
    /// Before-turn recall.
    Recall {
        /// Result.
        outcome: RecallOutcome,
        /// The payload, rewritten if context was injected.
        payload: Value,
    },
    /// Capture plus optional triage.
    Digest {
        /// Result.
        outcome: DigestOutcome,
    },
    /// Settings change.
    ConfigReloaded {
        /// Whether the new config took effect.
        applied: bool,
    },
}

/// Recall/digest policy engine.
pub struct PolicyEngine {
    backend: Arc<dyn MemoryBackend>,
    capture: ThreadCapture,
    config: RwLock<ResolvedConfig>,
    state: SessionState,
    clock: Arc<dyn Clock>,
    reload: Option<ConfigReload>,
    context_options: ContextOptions,
}

impl PolicyEngine {
    /// Engine over `backend` with the real clock and empty state.
    pub fn new(backend: Arc<dyn MemoryBackend>, config: ResolvedConfig) -> Self {
        Self {
            capture: ThreadCapture::new(backend.clone()),
            backend,
            config: RwLock::new(config),
            state: SessionState::new(),
            clock: Arc::new(SystemClock),
            reload: None,
            context_options: ContextOptions::default(),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the capture pipeline (source tag, limits).
    #[must_use]
    pub fn with_capture(mut self, capture: ThreadCapture) -> Self {
        self.capture = capture;
        self
    }

    /// How to re-resolve config on `settingsChanged`.
    #[must_use]
    pub fn with_reload(mut self, reload: ConfigReload) -> Self {
        self.reload = Some(reload);
        self
    }

    /// Override context formatting.
    #[must_use]
    pub fn with_context_options(mut self, opts: ContextOptions) -> Self {
        self.context_options = opts;
        self
    }

    /// Snapshot of the current config.
    pub fn config(&self) -> ResolvedConfig {
        self.config.read().clone()
    }

    /// Swap in a new config.
    pub fn set_config(&self, config: ResolvedConfig) {
        *self.config.write() = config;
    }

    /// Session state (recalled set, cooldowns).
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Dispatch one lifecycle event.
    pub async fn handle(&self, event: LifecycleEvent) -> EngineOutcome {
        debug!(event = event.name(), "lifecycle event");
        let reason = event.capture_reason();
        match event {
            LifecycleEvent::BeforeTurn { payload } => {
                let mut payload = TurnPayload::new(payload);
                let outcome = self.recall(&mut payload).await;
                EngineOutcome::Recall { outcome, payload: payload.into_value() }
            }
            LifecycleEvent::TurnEnded { success, payload } => EngineOutcome::Digest {
                outcome: self.digest(&payload, CaptureReason::TurnEnded, success).await,
            },
            LifecycleEvent::BeforeReset { payload }
            | LifecycleEvent::AfterCompaction { payload }
            | LifecycleEvent::AppQuit { payload } => EngineOutcome::Digest {
                outcome: self
                    .digest(&payload, reason.unwrap_or(CaptureReason::Manual), true)
                    .await,
            },
            LifecycleEvent::SettingsChanged { host_config } => EngineOutcome::ConfigReloaded {
                applied: self.reload_config(host_config.as_ref()),
            },
        }
    }

    /// Inject recalled context into an outgoing message.
    pub async fn recall(&self, payload: &mut TurnPayload) -> RecallOutcome {
        let config = self.config();
        let thread_id = stable_thread_id(&payload.thread_key());
        let content = payload.content();

        if let Err(reason) = recall_gate(&config, &self.state, &thread_id, &content) {
            debug!(%thread_id, ?reason, "recall skipped");
            return RecallOutcome::skipped(reason);
        }

        // thread_once claims the thread before the fetch so a concurrent
        // turn on the same thread cannot inject a second time
        let once = config.recall_frequency == RecallFrequency::ThreadOnce;
        if once && !self.state.claim_recall(&thread_id) {
            debug!(%thread_id, "recall skipped, thread claimed concurrently");
            return RecallOutcome::skipped(RecallSkip::AlreadyRecalled);
        }

        let outcome = self.inject(payload, &thread_id, &content, config.max_context_results).await;
        match &outcome {
            RecallOutcome::Injected { .. } if !once => {
                let _ = self.state.claim_recall(&thread_id);
            }
            RecallOutcome::Skipped { .. } if once => self.state.release_recall(&thread_id),
            _ => {}
        }
        outcome
    }

    async fn inject(
        &self,
        payload: &mut TurnPayload,
        thread_id: &str,
        content: &str,
        limit: usize,
    ) -> RecallOutcome {
        let ctx = fetch_recall_context(self.backend.as_ref(), content, limit).await;
        let Some(block) =
            build_context_block(ctx.working_memory.as_ref(), &ctx.results, &self.context_options)
        else {
            return RecallOutcome::skipped(RecallSkip::NothingFound);
        };

        let chars = block.chars().count();
        if !payload.set_content(prepend_context(&block, content)) {
            debug!(%thread_id, "recall: payload has no writable content field");
            return RecallOutcome::skipped(RecallSkip::NotWritable);
        }

        info!(%thread_id, chars, results = ctx.results.len(), "recall: context injected");
        RecallOutcome::Injected { thread_id: thread_id.to_string(), chars, results: ctx.results.len() }
    }

    /// Capture the session and, when eligible, triage and distill it.
    pub async fn digest(&self, payload: &Value, reason: CaptureReason, success: bool) -> DigestOutcome {
        let config = self.config();
        if !config.session_digest {
            return DigestOutcome::Skipped { reason: DigestSkip::Disabled };
        }
        if !success {
            return DigestOutcome::Skipped { reason: DigestSkip::TurnFailed };
        }

        let event = CaptureEvent::from_payload(payload);
        let Some(captured) = self.capture.append_or_create(&event, reason).await else {
            return DigestOutcome::Skipped { reason: DigestSkip::NothingCaptured };
        };

        let now = self.clock.now_ms();
        let cooldown = config.digest_cooldown();
        let gate = triage_gate(&captured, &self.state, now, cooldown).and_then(|conversation| {
            if self.state.try_begin_triage(&captured.thread_id, now, cooldown) {
                Ok(conversation)
            } else {
                Err(TriageSkip::Cooldown)
            }
        });
        let triage = match gate {
            Ok(conversation) => {
                triage_and_distill(self.backend.as_ref(), &captured.thread_id, &conversation).await
            }
            Err(skip) => {
                debug!(thread_id = %captured.thread_id, ?skip, "triage skipped");
                TriageStep::Skipped { reason: skip }
            }
        };

        DigestOutcome::Captured {
            thread_id: captured.thread_id,
            state: captured.state,
            messages_added: captured.messages_added,
            triage,
        }
    }

    /// Re-resolve config from a new host object. Keeps the old config on
    /// failure.
    pub fn reload_config(&self, host: Option<&Value>) -> bool {
        let Some(reload) = &self.reload else {
            warn!("settings changed but no reload source is configured");
            return false;
        };
        match reload(host) {
            Ok(config) => {
                info!(
                    session_context = config.session_context,
                    session_digest = config.session_digest,
                    "config reloaded"
                );
                self.set_config(config);
                true
            }
            Err(e) => {
                warn!(error = %e, "config reload rejected, keeping previous config");
                false
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
