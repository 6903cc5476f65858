//! Config file handling.
//!
//! Loading flow:
//! 1. Resolve the path (`MEMLINK_CONFIG`, else `~/.memlink/config.json`)
//! 2. Seed the file with `null` placeholders on first run (never with `apiKey`)
//! 3. Read the file layer; an unreadable file degrades to an empty layer
//! 4. Hand host, file, and environment layers to [`resolve`]

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::env::EnvSource;
use crate::errors::Result;
use crate::resolver::resolve;
use crate::types::{ConfigKey, ResolvedConfig};

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "MEMLINK_CONFIG";

/// Resolve the path to the config file.
pub fn config_path(env: &dyn EnvSource) -> PathBuf {
    if let Some(path) = env.var(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty()) {
        return PathBuf::from(path);
    }
    let home = env.var("HOME").unwrap_or_else(|| "/tmp".to_string());
    PathBuf::from(home).join(".memlink").join("config.json")
}

/// Contents written to a fresh config file. Never includes `apiKey`.
///
/// Every key is present but `null`, so a freshly seeded file defines
/// nothing and environment values still apply until the user edits it.
pub fn seed_contents() -> Value {
    let keys = ConfigKey::ALL
        .into_iter()
        .filter(|key| *key != ConfigKey::ApiKey)
        .map(|key| (key.as_str().to_string(), Value::Null));
    Value::Object(keys.collect())
}

/// Write the seed file if none exists. Returns `true` when a file was created.
pub fn seed_config_file(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(&seed_contents())?;
    std::fs::write(path, format!("{body}\n"))?;
    info!(?path, "created config file with defaults");
    Ok(true)
}

/// Read the file layer. Returns `None` when the file does not exist.
///
/// Invalid JSON is an error.
pub fn load_file_layer(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        debug!(?path, "config file not found");
        return Ok(None);
    }
    debug!(?path, "loading config file");
    let content = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Resolve configuration from a specific file path.
///
/// The file is seeded if absent. A file that cannot be read or parsed is
/// logged and skipped; only host-config errors are returned.
pub fn load_config_from_path(
    path: &Path,
    host: Option<&Value>,
    env: &dyn EnvSource,
) -> Result<ResolvedConfig> {
    if let Err(e) = seed_config_file(path) {
        warn!(error = %e, ?path, "could not seed config file");
    }

    let file = match load_file_layer(path) {
        Ok(file) => file,
        Err(e) => {
            warn!(error = %e, ?path, "ignoring unreadable config file");
            None
        }
    };

    match resolve(host, file.as_ref(), env) {
        Ok(config) => Ok(config),
        Err(crate::SettingsError::InvalidShape { layer: "file" }) => {
            warn!(?path, "config file is not a JSON object, ignoring it");
            resolve(host, None, env)
        }
        Err(e) => Err(e),
    }
}

/// Resolve configuration from the default path.
pub fn load_config(host: Option<&Value>, env: &dyn EnvSource) -> Result<ResolvedConfig> {
    load_config_from_path(&config_path(env), host, env)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;
    use crate::types::ConfigSource;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn config_path_prefers_override() {
        let path = config_path(&env(&[("MEMLINK_CONFIG", "/etc/memlink.json"), ("HOME", "/home/u")]));
        assert_eq!(path, PathBuf::from("/etc/memlink.json"));
    }

    #[test]
    fn config_path_under_home() {
        let path = config_path(&env(&[("HOME", "/home/u")]));
        assert_eq!(path, PathBuf::from("/home/u/.memlink/config.json"));
    }

    #[test]
    fn seed_creates_file_without_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        assert!(seed_config_file(&path).unwrap());
        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["maxContextResults"], Value::Null);
        assert_eq!(written["sessionDigest"], Value::Null);
        assert!(written.get("recallFrequency").is_some());
        assert!(written.get("apiKey").is_none());

        // Second call leaves the file alone
        assert!(!seed_config_file(&path).unwrap());
    }

    #[test]
    fn seeding_with_key_in_env_still_omits_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let env = env(&[("NMEM_API_KEY", "sk-live-secret")]);

        let cfg = load_config_from_path(&path, None, &env).unwrap();
        assert!(cfg.api_key.is_some());
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("sk-live-secret"));
        assert!(!raw.contains("apiKey"));
    }

    #[test]
    fn env_values_survive_a_freshly_seeded_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let env = env(&[
            ("NMEM_SESSION_CONTEXT", "true"),
            ("NMEM_MAX_CONTEXT_RESULTS", "12"),
            ("NMEM_RECALL_FREQUENCY", "every_message"),
        ]);

        let cfg = load_config_from_path(&path, None, &env).unwrap();
        assert!(path.exists());
        assert!(cfg.session_context);
        assert_eq!(cfg.sources.get(ConfigKey::SessionContext), ConfigSource::Env);
        assert_eq!(cfg.max_context_results, 12);
        assert_eq!(cfg.sources.get(ConfigKey::MaxContextResults), ConfigSource::Env);
        assert_eq!(cfg.sources.get(ConfigKey::DigestMinInterval), ConfigSource::Default);

        // Same result once the file already exists
        let again = load_config_from_path(&path, None, &env).unwrap();
        assert_eq!(again, cfg);
    }

    #[test]
    fn missing_file_layer_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_file_layer(&dir.path().join("absent.json")).unwrap().is_none());
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_file_layer(&path), Err(SettingsError::Json(_))));
    }

    #[test]
    fn invalid_json_degrades_to_env_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let cfg = load_config_from_path(&path, None, &env(&[("NMEM_MAX_CONTEXT_RESULTS", "8")])).unwrap();
        assert_eq!(cfg.max_context_results, 8);
        assert_eq!(cfg.sources.get(ConfigKey::MaxContextResults), ConfigSource::Env);
    }

    #[test]
    fn file_values_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"sessionContext": true, "captureMinInterval": 120}"#).unwrap();

        let cfg = load_config_from_path(&path, None, &env(&[])).unwrap();
        assert!(cfg.session_context);
        assert_eq!(cfg.digest_min_interval, 120);
        assert_eq!(cfg.sources.get(ConfigKey::SessionContext), ConfigSource::File);
    }

    #[test]
    fn non_object_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let cfg = load_config_from_path(&path, None, &env(&[])).unwrap();
        assert_eq!(cfg.max_context_results, 5);
    }

    #[test]
    fn host_errors_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let host = serde_json::json!({"bogus": 1});
        assert!(matches!(
            load_config_from_path(&path, Some(&host), &env(&[])),
            Err(SettingsError::UnknownKeys { .. })
        ));
    }
}
