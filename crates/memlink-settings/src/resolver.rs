//! Configuration resolution.
//!
//! Resolution flow:
//! 1. Canonicalize each layer through [`LEGACY_ALIASES`] (canonical wins)
//! 2. Reject unknown keys in the host layer only
//! 3. Per key, take the first layer that defines it: host → file → env
//! 4. Coerce and clamp; invalid values fall back to the compiled default
//!
//! `null` and empty strings count as "not defined", so the placeholders in a
//! seeded file never mask environment values.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::env::{EnvSource, env_layer, parse_bool, parse_finite};
use crate::errors::{Result, SettingsError};
use crate::types::{
    ApiKey, ConfigKey, ConfigSource, MAX_CONTEXT_RESULTS, MAX_DIGEST_MIN_INTERVAL,
    MIN_CONTEXT_RESULTS, RecallFrequency, ResolvedConfig,
};

/// Legacy key names and the canonical key each maps to.
pub const LEGACY_ALIASES: &[(&str, ConfigKey)] = &[
    ("autoRecall", ConfigKey::SessionContext),
    ("autoCapture", ConfigKey::SessionDigest),
    ("captureMinInterval", ConfigKey::DigestMinInterval),
    ("maxRecallResults", ConfigKey::MaxContextResults),
];

/// Every key accepted in host configuration (canonical then legacy).
pub fn allowed_keys() -> Vec<String> {
    ConfigKey::ALL
        .iter()
        .map(|k| k.as_str().to_string())
        .chain(LEGACY_ALIASES.iter().map(|(name, _)| (*name).to_string()))
        .collect()
}

/// Map legacy names onto canonical ones. Unknown keys are returned separately.
fn canonicalize(raw: &Map<String, Value>) -> (Map<String, Value>, Vec<String>) {
    let mut out = Map::new();
    let mut unknown = Vec::new();

    for (name, value) in raw {
        if ConfigKey::from_canonical(name).is_some() {
            let _ = out.insert(name.clone(), value.clone());
        } else if !LEGACY_ALIASES.iter().any(|(legacy, _)| legacy == name) {
            unknown.push(name.clone());
        }
    }
    for (legacy, key) in LEGACY_ALIASES {
        if let Some(value) = raw.get(*legacy) {
            if !out.contains_key(key.as_str()) {
                let _ = out.insert(key.as_str().to_string(), value.clone());
            }
        }
    }
    (out, unknown)
}

fn as_object<'a>(
    value: Option<&'a Value>,
    layer: &'static str,
) -> Result<Option<&'a Map<String, Value>>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(SettingsError::InvalidShape { layer }),
    }
}

fn is_defined(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => parse_bool(s),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_finite(s),
        _ => None,
    }
}

/// Clamp a finite number into `[min, max]`, dropping any fraction.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn clamp_u64(n: f64, min: u64, max: u64) -> u64 {
    let clamped = n.trunc().clamp(min as f64, max as f64);
    clamped as u64
}

fn coerce_string(value: &Value) -> Option<String> {
    value.as_str().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the effective configuration from host, file, and environment layers.
///
/// `host` is strict: unknown keys fail with [`SettingsError::UnknownKeys`].
/// `file` is lenient: unknown keys are ignored, and `apiKey` is never read
/// from it.
pub fn resolve(
    host: Option<&Value>,
    file: Option<&Value>,
    env: &dyn EnvSource,
) -> Result<ResolvedConfig> {
    let host_layer = match as_object(host, "host")? {
        Some(map) => {
            let (canonical, unknown) = canonicalize(map);
            if !unknown.is_empty() {
                return Err(SettingsError::UnknownKeys {
                    keys: unknown,
                    allowed: allowed_keys(),
                });
            }
            canonical
        }
        None => Map::new(),
    };

    let file_layer = match as_object(file, "file")? {
        Some(map) => {
            let (mut canonical, unknown) = canonicalize(map);
            if !unknown.is_empty() {
                debug!(keys = ?unknown, "ignoring unknown keys in config file");
            }
            if canonical.remove(ConfigKey::ApiKey.as_str()).is_some() {
                warn!("apiKey in config file is ignored; set it in host config or NMEM_API_KEY");
            }
            canonical
        }
        None => Map::new(),
    };

    let env_layer = env_layer(env);

    let layers: [(ConfigSource, &Map<String, Value>); 3] = [
        (ConfigSource::Host, &host_layer),
        (ConfigSource::File, &file_layer),
        (ConfigSource::Env, &env_layer),
    ];

    let mut config = ResolvedConfig::default();
    for key in ConfigKey::ALL {
        let Some((source, value)) = layers.iter().find_map(|(source, layer)| {
            layer
                .get(key.as_str())
                .filter(|v| is_defined(v))
                .map(|v| (*source, v))
        }) else {
            continue;
        };

        if apply(&mut config, key, value) {
            config.sources.set(key, source);
        } else {
            warn!(key = %key, source = %source, "invalid config value, using default");
        }
    }

    Ok(config)
}

/// Apply one value to `config`. Returns `false` when it could not be coerced.
fn apply(config: &mut ResolvedConfig, key: ConfigKey, value: &Value) -> bool {
    match key {
        ConfigKey::SessionContext => {
            let Some(b) = coerce_bool(value) else { return false };
            config.session_context = b;
        }
        ConfigKey::SessionDigest => {
            let Some(b) = coerce_bool(value) else { return false };
            config.session_digest = b;
        }
        ConfigKey::DigestMinInterval => {
            let Some(n) = coerce_number(value) else { return false };
            config.digest_min_interval = clamp_u64(n, 0, MAX_DIGEST_MIN_INTERVAL);
        }
        ConfigKey::MaxContextResults => {
            let Some(n) = coerce_number(value) else { return false };
            let clamped = clamp_u64(n, MIN_CONTEXT_RESULTS as u64, MAX_CONTEXT_RESULTS as u64);
            config.max_context_results = usize::try_from(clamped).unwrap_or(MAX_CONTEXT_RESULTS);
        }
        ConfigKey::RecallFrequency => {
            let Some(f) = value.as_str().and_then(RecallFrequency::parse) else { return false };
            config.recall_frequency = f;
        }
        ConfigKey::ApiUrl => {
            let Some(url) = coerce_string(value) else { return false };
            config.api_url = url.trim_end_matches('/').to_string();
        }
        ConfigKey::ApiKey => {
            let Some(secret) = coerce_string(value) else { return false };
            config.api_key = Some(ApiKey::new(secret));
        }
    }
    true
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
