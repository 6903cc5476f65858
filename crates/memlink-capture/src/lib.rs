//! # memlink-capture
//!
//! Turns a session's messages into an idempotent thread append.
//!
//! - **Normalize** ([`normalize_messages`]): heterogeneous host messages to
//!   `{role, content, timestamp, external_hint}`, in order
//! - **Identity** ([`stable_thread_id`], [`external_id`],
//!   [`batch_idempotency_key`]): pure, deterministic ids
//! - **Transcript** ([`read_transcript`]): tolerant JSONL reader
//! - **Capture** ([`ThreadCapture`]): append first, create on not-found

#![deny(unsafe_code)]

pub mod capture;
pub mod errors;
pub mod identity;
pub mod normalize;
pub mod transcript;

pub use capture::{
    CaptureEvent, CaptureOutcome, CaptureReason, PreparedBatch, ThreadCapture, ThreadState,
    prepare_batch, thread_title,
};
pub use errors::{CaptureError, Result};
pub use identity::{batch_idempotency_key, external_id, session_key, stable_thread_id};
pub use normalize::{
    NormalizeOptions, NormalizedMessage, Role, conversation_text, extract_text,
    normalize_messages,
};
pub use transcript::{parse_transcript, read_transcript};
