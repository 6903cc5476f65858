//! Client errors and error classification.
//!
//! The CLI is an opaque external process, so most failures arrive as free
//! text. [`classify`] maps that text onto an [`ErrorKind`] through a single
//! ordered pattern table; callers branch on the kind, never on the text.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Classified error kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad caller input. Never retried.
    ValidationError,
    /// CLI exited non-zero for an unrecognized reason.
    CliError,
    /// The target (thread, memory) does not exist.
    NotFound,
    /// Credentials missing or rejected.
    PermissionDenied,
    /// Output was not parseable JSON.
    InvalidJson,
    /// No usable `nmem` binary.
    NmemNotFound,
    /// The backend has no LLM available for triage/distillation.
    ModelUnavailable,
    /// The CLI does not know this subcommand or flag.
    Unsupported,
    /// A time bound was exceeded.
    Timeout,
    /// Connection-level HTTP failure.
    Network,
    /// HTTP response with an error status.
    HttpError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationError => write!(f, "validation_error"),
            Self::CliError => write!(f, "cli_error"),
            Self::NotFound => write!(f, "not_found"),
            Self::PermissionDenied => write!(f, "permission_denied"),
            Self::InvalidJson => write!(f, "invalid_json"),
            Self::NmemNotFound => write!(f, "nmem_not_found"),
            Self::ModelUnavailable => write!(f, "model_unavailable"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Timeout => write!(f, "timeout"),
            Self::Network => write!(f, "network"),
            Self::HttpError => write!(f, "http_error"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pattern matching
// ─────────────────────────────────────────────────────────────────────────────

struct KindPattern {
    check: fn(&str) -> bool,
    kind: ErrorKind,
}

/// An HTTP status echoed in error text, e.g. `HTTP 404` or `status: 403`.
///
/// Bare digits are not enough: thread ids carry hex hashes and slugs that
/// routinely contain `401`, `403` or `404`.
static STATUS_CODE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b(?:http|status(?:\s+code)?|error|code)[\s:=]*(40[134])\b").ok()
});

fn echoed_status(s: &str) -> Option<u16> {
    let re = STATUS_CODE.as_ref()?;
    re.captures(s)?.get(1)?.as_str().parse().ok()
}

/// Known error signatures, checked in order against lowercased text.
fn patterns() -> &'static [KindPattern] {
    static PATTERNS: &[KindPattern] = &[
        // Unsupported must win: "invalid choice: 'append'" is not a not-found
        KindPattern {
            check: |s| {
                s.contains("unrecognized arguments")
                    || s.contains("invalid choice")
                    || s.contains("no such command")
                    || s.contains("unknown command")
                    || s.contains("no such option")
            },
            kind: ErrorKind::Unsupported,
        },
        KindPattern {
            check: |s| {
                s.contains("nmem: command not found")
                    || s.contains("nmem: not found")
                    || s.contains("nmem cli not found")
            },
            kind: ErrorKind::NmemNotFound,
        },
        KindPattern {
            check: |s| {
                (s.contains("model")
                    && (s.contains("unavailable")
                        || s.contains("not available")
                        || s.contains("not configured")))
                    || s.contains("no llm")
                    || s.contains("llm is not configured")
            },
            kind: ErrorKind::ModelUnavailable,
        },
        KindPattern {
            check: |s| {
                s.contains("permission denied")
                    || s.contains("unauthorized")
                    || s.contains("forbidden")
                    || s.contains("invalid api key")
                    || matches!(echoed_status(s), Some(401 | 403))
            },
            kind: ErrorKind::PermissionDenied,
        },
        KindPattern {
            check: |s| {
                s.contains("not found")
                    || s.contains("does not exist")
                    || s.contains("no thread")
                    || echoed_status(s) == Some(404)
            },
            kind: ErrorKind::NotFound,
        },
        KindPattern {
            check: |s| s.contains("timed out") || s.contains("timeout"),
            kind: ErrorKind::Timeout,
        },
        KindPattern {
            check: |s| s.contains("invalid json") || s.contains("expecting value"),
            kind: ErrorKind::InvalidJson,
        },
        KindPattern {
            check: |s| s.contains("validation error") || s.contains("invalid value"),
            kind: ErrorKind::ValidationError,
        },
    ];
    PATTERNS
}

/// Classify free-form error text. Unmatched text is [`ErrorKind::CliError`].
pub fn classify(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    patterns()
        .iter()
        .find(|p| (p.check)(&lower))
        .map_or(ErrorKind::CliError, |p| p.kind)
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from the memory client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Caller input was rejected before any transport ran.
    #[error("validation error: {0}")]
    Validation(String),
    /// Neither `nmem` nor the `uvx` wrapper responded to `--version`.
    #[error("nmem CLI not found. Install with: pip install nmem-cli (or make uvx available)")]
    NmemNotFound,
    /// Could not start the process.
    #[error("failed to spawn nmem: {0}")]
    Spawn(String),
    /// The CLI exited non-zero.
    #[error("{message}")]
    Cli {
        /// stderr, or stdout when stderr was empty.
        message: String,
        /// Exit code (`-1` when killed by a signal).
        exit_code: i32,
    },
    /// The CLI or API returned something that is not JSON.
    #[error("invalid JSON response: {0}")]
    InvalidJson(String),
    /// The command or request exceeded its time bound.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// What was running.
        operation: String,
        /// The bound that was exceeded.
        timeout_ms: u64,
    },
    /// The operation was cancelled by the caller.
    #[error("{0} was cancelled")]
    Cancelled(String),
    /// HTTP error status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Status code.
        status: u16,
        /// `detail`/`message` from the body, or the status reason.
        message: String,
    },
    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),
}

impl ClientError {
    /// Classified kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::NmemNotFound => ErrorKind::NmemNotFound,
            Self::Spawn(_) | Self::Cancelled(_) => ErrorKind::CliError,
            Self::Cli { message, .. } => classify(message),
            Self::InvalidJson(_) => ErrorKind::InvalidJson,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Http { status: 404, .. } => ErrorKind::NotFound,
            Self::Http { status: 401 | 403, .. } => ErrorKind::PermissionDenied,
            Self::Http { message, .. } => match classify(message) {
                ErrorKind::CliError => ErrorKind::HttpError,
                kind => kind,
            },
            Self::Network(_) => ErrorKind::Network,
        }
    }

    /// Whether this error means the target does not exist.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Whether the CLI rejected the subcommand or a flag.
    pub fn is_unsupported(&self) -> bool {
        self.kind() == ErrorKind::Unsupported
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
