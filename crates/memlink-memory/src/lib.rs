//! # memlink-memory
//!
//! Host-facing behaviour on top of the memory client and capture pipeline.
//!
//! - **Engine** ([`PolicyEngine`]): maps [`LifecycleEvent`]s to recall or
//!   digest, owns session state and the resolved config
//! - **Recall** ([`recall_gate`], [`fetch_recall_context`]): whether to
//!   inject, and what
//! - **Digest** ([`triage_gate`], [`triage_and_distill`]): capture, then
//!   triage under a per-thread cooldown
//! - **Context** ([`build_context_block`]): escaped, delimited prompt blocks
//! - **Payload** ([`TurnPayload`]): read and rewrite outgoing message text
//! - **Commands** ([`commands`]): search, remember, forget, status and the
//!   read-only inspection commands
//!
//! Engine paths never fail the host's turn. Errors are logged and surfaced in
//! the returned outcome.

#![deny(unsafe_code)]

pub mod commands;
pub mod context;
pub mod digest;
pub mod engine;
pub mod events;
pub mod payload;
pub mod recall;
pub mod state;

pub use commands::{CommandReply, DedupPolicy, ForgetPolicy, RememberRequest};
pub use context::{ContextOptions, build_context_block, guidance_block, prepend_context};
pub use digest::{DigestOutcome, DigestSkip, TriageSkip, TriageStep, triage_and_distill, triage_gate};
pub use engine::{ConfigReload, EngineOutcome, PolicyEngine};
pub use events::LifecycleEvent;
pub use payload::TurnPayload;
pub use recall::{RecallOutcome, RecallSkip, RecalledContext, fetch_recall_context, recall_gate};
pub use state::{Clock, ManualClock, SessionState, SystemClock};
