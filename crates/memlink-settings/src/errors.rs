//! Settings error types.

use thiserror::Error;

/// Errors that can occur when loading or resolving settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read or write the config file.
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the config file.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Host-supplied configuration contained keys we do not recognize.
    #[error("unknown config key(s): {}. Allowed keys: {}", keys.join(", "), allowed.join(", "))]
    UnknownKeys {
        /// Offending keys, in the order they were found.
        keys: Vec<String>,
        /// Every key the resolver accepts.
        allowed: Vec<String>,
    },
    /// A configuration layer was not a JSON object.
    #[error("invalid config shape in {layer}: expected a JSON object")]
    InvalidShape {
        /// Which layer was malformed (`host` or `file`).
        layer: &'static str,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_lists_allowed() {
        let err = SettingsError::UnknownKeys {
            keys: vec!["sesionContext".into()],
            allowed: vec!["sessionContext".into(), "apiUrl".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("sesionContext"));
        assert!(msg.contains("Allowed keys: sessionContext, apiUrl"));
    }

    #[test]
    fn json_error_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err = SettingsError::Json(json_err);
        assert!(err.to_string().contains("parse config JSON"));
    }

    #[test]
    fn invalid_shape_names_layer() {
        let err = SettingsError::InvalidShape { layer: "host" };
        assert_eq!(err.to_string(), "invalid config shape in host: expected a JSON object");
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: SettingsError = io_err.into();
        assert!(matches!(err, SettingsError::Io(_)));
    }
}
