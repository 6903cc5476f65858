//! Host lifecycle events.
//!
//! The host serializes one of these per hook invocation. Payloads stay as raw
//! JSON because every host shapes them differently; field lookup happens
//! through the ordered tables in [`crate::payload`] and
//! [`memlink_capture::identity`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use memlink_capture::CaptureReason;

fn default_true() -> bool {
    true
}

/// One lifecycle event from the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LifecycleEvent {
    /// A user message is about to be sent to the model.
    BeforeTurn {
        /// `{input, output}` or a bare message object.
        #[serde(default)]
        payload: Value,
    },
    /// An agent turn finished.
    TurnEnded {
        /// Whether the turn completed without error.
        #[serde(default = "default_true")]
        success: bool,
        /// Session identity plus `messages` or `sessionFile`.
        #[serde(default)]
        payload: Value,
    },
    /// The session is about to be cleared.
    BeforeReset {
        /// Session identity plus `messages` or `sessionFile`.
        #[serde(default)]
        payload: Value,
    },
    /// The session history was compacted.
    AfterCompaction {
        /// Session identity plus `messages` or `sessionFile`.
        #[serde(default)]
        payload: Value,
    },
    /// The host is shutting down.
    AppQuit {
        /// Session identity plus `messages` or `sessionFile`.
        #[serde(default)]
        payload: Value,
    },
    /// Plugin settings were edited in the host.
    #[serde(rename_all = "camelCase")]
    SettingsChanged {
        /// New host-level configuration object.
        #[serde(default)]
        host_config: Option<Value>,
    },
}

impl LifecycleEvent {
    /// Capture reason for digest events, `None` for the others.
    pub fn capture_reason(&self) -> Option<CaptureReason> {
        match self {
            Self::TurnEnded { .. } => Some(CaptureReason::TurnEnded),
            Self::BeforeReset { .. } => Some(CaptureReason::BeforeReset),
            Self::AfterCompaction { .. } => Some(CaptureReason::AfterCompaction),
            Self::AppQuit { .. } => Some(CaptureReason::AppQuit),
            Self::BeforeTurn { .. } | Self::SettingsChanged { .. } => None,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BeforeTurn { .. } => "beforeTurn",
            Self::TurnEnded { .. } => "turnEnded",
            Self::BeforeReset { .. } => "beforeReset",
            Self::AfterCompaction { .. } => "afterCompaction",
            Self::AppQuit { .. } => "appQuit",
            Self::SettingsChanged { .. } => "settingsChanged",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
