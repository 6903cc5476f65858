//! Environment variable layer.
//!
//! Environment access goes through [`EnvSource`] so resolution stays pure and
//! tests never touch the process environment.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::types::ConfigKey;

/// Read-only view of environment variables.
pub trait EnvSource {
    /// Value of `name`, if set.
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Variable names per key, canonical name first, legacy names after.
pub const ENV_VARS: &[(ConfigKey, &[&str])] = &[
    (ConfigKey::SessionContext, &["NMEM_SESSION_CONTEXT", "NMEM_AUTO_RECALL"]),
    (ConfigKey::SessionDigest, &["NMEM_SESSION_DIGEST", "NMEM_AUTO_CAPTURE"]),
    (
        ConfigKey::DigestMinInterval,
        &["NMEM_DIGEST_MIN_INTERVAL", "NMEM_CAPTURE_MIN_INTERVAL"],
    ),
    (
        ConfigKey::MaxContextResults,
        &["NMEM_MAX_CONTEXT_RESULTS", "NMEM_MAX_RECALL_RESULTS"],
    ),
    (ConfigKey::RecallFrequency, &["NMEM_RECALL_FREQUENCY"]),
    (ConfigKey::ApiUrl, &["NMEM_API_URL"]),
    (ConfigKey::ApiKey, &["NMEM_API_KEY"]),
];

/// Collect the environment layer as raw string values keyed by canonical name.
///
/// Empty variables count as unset. Typing happens later in the resolver so
/// every layer shares one coercion path.
pub fn env_layer(env: &dyn EnvSource) -> Map<String, Value> {
    let mut layer = Map::new();
    for (key, names) in ENV_VARS {
        let found = names
            .iter()
            .find_map(|name| env.var(name).filter(|v| !v.trim().is_empty()));
        if let Some(value) = found {
            let _ = layer.insert(key.as_str().to_string(), Value::String(value));
        }
    }
    layer
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a finite number.
pub fn parse_finite(val: &str) -> Option<f64> {
    val.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn parse_bool_truthy() {
        for v in ["true", "TRUE", "1", "yes", "on", " On "] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
    }

    #[test]
    fn parse_bool_falsy() {
        for v in ["false", "0", "no", "off"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
    }

    #[test]
    fn parse_bool_invalid() {
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn parse_finite_rejects_nan_and_inf() {
        assert_eq!(parse_finite("12"), Some(12.0));
        assert_eq!(parse_finite("NaN"), None);
        assert_eq!(parse_finite("inf"), None);
        assert_eq!(parse_finite("abc"), None);
    }

    #[test]
    fn canonical_name_wins_over_legacy() {
        let layer = env_layer(&env(&[
            ("NMEM_SESSION_CONTEXT", "false"),
            ("NMEM_AUTO_RECALL", "true"),
        ]));
        assert_eq!(layer["sessionContext"], "false");
    }

    #[test]
    fn legacy_name_used_when_canonical_absent() {
        let layer = env_layer(&env(&[("NMEM_MAX_RECALL_RESULTS", "7")]));
        assert_eq!(layer["maxContextResults"], "7");
    }

    #[test]
    fn empty_values_are_unset() {
        let layer = env_layer(&env(&[("NMEM_API_URL", "  ")]));
        assert!(layer.is_empty());
    }
}
