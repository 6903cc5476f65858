//! Capture error types.

use memlink_client::ClientError;

/// Errors from transcript reading and thread persistence.
///
/// [`ThreadCapture`](crate::ThreadCapture) never surfaces these to the host;
/// they are logged and the capture is abandoned.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Session transcript could not be read.
    #[error("transcript read failed: {0}")]
    Transcript(#[from] std::io::Error),

    /// Backend rejected the append or create.
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CaptureError>;
