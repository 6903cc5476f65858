//! Resolved configuration types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// API base URL used when none is configured.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:14242";

/// Default cooldown between triage runs for one thread, in seconds.
pub const DEFAULT_DIGEST_MIN_INTERVAL: u64 = 300;
/// Upper bound for `digestMinInterval` (one day).
pub const MAX_DIGEST_MIN_INTERVAL: u64 = 86_400;

/// Default number of memories recalled per turn.
pub const DEFAULT_MAX_CONTEXT_RESULTS: usize = 5;
/// Lower bound for `maxContextResults`.
pub const MIN_CONTEXT_RESULTS: usize = 1;
/// Upper bound for `maxContextResults`.
pub const MAX_CONTEXT_RESULTS: usize = 20;

// ─────────────────────────────────────────────────────────────────────────────
// Keys
// ─────────────────────────────────────────────────────────────────────────────

/// Every canonical configuration key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigKey {
    /// Inject recalled context before turns.
    SessionContext,
    /// Capture threads after turns.
    SessionDigest,
    /// Triage cooldown in seconds.
    DigestMinInterval,
    /// Search result count for recall.
    MaxContextResults,
    /// `thread_once` or `every_message`.
    RecallFrequency,
    /// HTTP API base URL.
    ApiUrl,
    /// API key for remote servers.
    ApiKey,
}

impl ConfigKey {
    /// All keys, in display order.
    pub const ALL: [Self; 7] = [
        Self::SessionContext,
        Self::SessionDigest,
        Self::DigestMinInterval,
        Self::MaxContextResults,
        Self::RecallFrequency,
        Self::ApiUrl,
        Self::ApiKey,
    ];

    /// Canonical camelCase name as it appears in JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionContext => "sessionContext",
            Self::SessionDigest => "sessionDigest",
            Self::DigestMinInterval => "digestMinInterval",
            Self::MaxContextResults => "maxContextResults",
            Self::RecallFrequency => "recallFrequency",
            Self::ApiUrl => "apiUrl",
            Self::ApiKey => "apiKey",
        }
    }

    /// Look up a canonical key by its JSON name.
    pub fn from_canonical(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sources
// ─────────────────────────────────────────────────────────────────────────────

/// Where a resolved value came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Host/plugin-supplied configuration object.
    Host,
    /// User config file.
    File,
    /// Environment variable.
    Env,
    /// Compiled default.
    #[default]
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::File => write!(f, "file"),
            Self::Env => write!(f, "env"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Per-key provenance of a [`ResolvedConfig`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigSources {
    entries: Vec<(ConfigKey, ConfigSource)>,
}

impl ConfigSources {
    /// Record the source for `key`, replacing any earlier record.
    pub fn set(&mut self, key: ConfigKey, source: ConfigSource) {
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push((key, source));
    }

    /// Source for `key` (defaults when never recorded).
    pub fn get(&self, key: ConfigKey) -> ConfigSource {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, s)| *s)
            .unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Values
// ─────────────────────────────────────────────────────────────────────────────

/// How often recalled context is injected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallFrequency {
    /// At most once per thread for the life of the process.
    #[default]
    ThreadOnce,
    /// Every eligible turn.
    EveryMessage,
}

impl RecallFrequency {
    /// Parse `thread_once` / `every_message` (case-insensitive, `-` accepted).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "thread_once" => Some(Self::ThreadOnce),
            "every_message" => Some(Self::EveryMessage),
            _ => None,
        }
    }
}

impl fmt::Display for RecallFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThreadOnce => write!(f, "thread_once"),
            Self::EveryMessage => write!(f, "every_message"),
        }
    }
}

/// API key wrapper whose `Debug`/`Display` never reveal the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a raw key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw secret. Only transports should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Fully resolved configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedConfig {
    /// Inject recalled context before each eligible turn.
    pub session_context: bool,
    /// Capture threads and run triage after turns.
    pub session_digest: bool,
    /// Triage cooldown per thread, in seconds.
    pub digest_min_interval: u64,
    /// Number of memories to recall per turn.
    pub max_context_results: usize,
    /// Recall injection frequency.
    pub recall_frequency: RecallFrequency,
    /// API base URL; empty means [`DEFAULT_API_URL`].
    pub api_url: String,
    /// Optional API key.
    pub api_key: Option<ApiKey>,
    /// Where each value came from.
    pub sources: ConfigSources,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            session_context: false,
            session_digest: false,
            digest_min_interval: DEFAULT_DIGEST_MIN_INTERVAL,
            max_context_results: DEFAULT_MAX_CONTEXT_RESULTS,
            recall_frequency: RecallFrequency::ThreadOnce,
            api_url: String::new(),
            api_key: None,
            sources: ConfigSources::default(),
        }
    }
}

impl ResolvedConfig {
    /// Base URL to use for HTTP calls.
    pub fn effective_api_url(&self) -> &str {
        if self.api_url.is_empty() {
            DEFAULT_API_URL
        } else {
            &self.api_url
        }
    }

    /// Whether a non-default API URL is configured.
    pub fn has_custom_api_url(&self) -> bool {
        !self.api_url.is_empty() && self.api_url != DEFAULT_API_URL
    }

    /// Triage cooldown as a [`std::time::Duration`].
    pub fn digest_cooldown(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.digest_min_interval)
    }

    /// Human-readable `(key, value, source)` rows; the API key is masked.
    pub fn describe(&self) -> Vec<(ConfigKey, String, ConfigSource)> {
        ConfigKey::ALL
            .into_iter()
            .map(|key| {
                let value = match key {
                    ConfigKey::SessionContext => self.session_context.to_string(),
                    ConfigKey::SessionDigest => self.session_digest.to_string(),
                    ConfigKey::DigestMinInterval => format!("{}s", self.digest_min_interval),
                    ConfigKey::MaxContextResults => self.max_context_results.to_string(),
                    ConfigKey::RecallFrequency => self.recall_frequency.to_string(),
                    ConfigKey::ApiUrl => self.effective_api_url().to_string(),
                    ConfigKey::ApiKey => {
                        let state = if self.api_key.is_some() { "(set)" } else { "(not set)" };
                        state.to_string()
                    }
                };
                (key, value, self.sources.get(key))
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ResolvedConfig::default();
        assert!(!cfg.session_context);
        assert!(!cfg.session_digest);
        assert_eq!(cfg.digest_min_interval, 300);
        assert_eq!(cfg.max_context_results, 5);
        assert_eq!(cfg.recall_frequency, RecallFrequency::ThreadOnce);
        assert_eq!(cfg.effective_api_url(), DEFAULT_API_URL);
        assert!(!cfg.has_custom_api_url());
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("sk-secret-123");
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
        assert_eq!(key.to_string(), "***");
        assert_eq!(key.expose(), "sk-secret-123");
    }

    #[test]
    fn resolved_config_debug_hides_key() {
        let cfg = ResolvedConfig {
            api_key: Some(ApiKey::new("sk-secret-123")),
            ..Default::default()
        };
        assert!(!format!("{cfg:?}").contains("sk-secret-123"));
    }

    #[test]
    fn recall_frequency_parse() {
        assert_eq!(RecallFrequency::parse("thread_once"), Some(RecallFrequency::ThreadOnce));
        assert_eq!(RecallFrequency::parse("Every-Message"), Some(RecallFrequency::EveryMessage));
        assert_eq!(RecallFrequency::parse("sometimes"), None);
    }

    #[test]
    fn config_key_round_trip_names() {
        for key in ConfigKey::ALL {
            assert_eq!(ConfigKey::from_canonical(key.as_str()), Some(key));
        }
        assert_eq!(ConfigKey::from_canonical("autoRecall"), None);
    }

    #[test]
    fn sources_default_and_override() {
        let mut sources = ConfigSources::default();
        assert_eq!(sources.get(ConfigKey::ApiUrl), ConfigSource::Default);
        sources.set(ConfigKey::ApiUrl, ConfigSource::Env);
        sources.set(ConfigKey::ApiUrl, ConfigSource::Host);
        assert_eq!(sources.get(ConfigKey::ApiUrl), ConfigSource::Host);
    }

    #[test]
    fn describe_masks_key() {
        let cfg = ResolvedConfig {
            api_key: Some(ApiKey::new("sk-secret-123")),
            ..Default::default()
        };
        let rows = cfg.describe();
        assert_eq!(rows.len(), ConfigKey::ALL.len());
        let (_, value, _) = rows.iter().find(|(k, _, _)| *k == ConfigKey::ApiKey).unwrap();
        assert_eq!(value, "(set)");
        assert!(rows.iter().all(|(_, v, _)| !v.contains("sk-secret")));
    }
}
