//! # memlink-settings
//!
//! Layered configuration for memlink.
//!
//! Values are resolved per key from four layers (highest priority first):
//! 1. **Host config**: object supplied by the embedding host (strict keys)
//! 2. **Config file**: `~/.memlink/config.json` (lenient, never holds `apiKey`)
//! 3. **Environment variables**: `NMEM_*`, canonical and legacy names
//! 4. **Compiled defaults**: [`ResolvedConfig::default()`]
//!
//! Legacy keys (`autoRecall`, `autoCapture`, `captureMinInterval`,
//! `maxRecallResults`) are mapped through a declarative alias table.

#![deny(unsafe_code)]

pub mod env;
pub mod errors;
pub mod loader;
pub mod resolver;
pub mod types;

pub use env::{EnvSource, ProcessEnv};
pub use errors::{Result, SettingsError};
pub use loader::{config_path, load_config, load_config_from_path, seed_config_file};
pub use resolver::{LEGACY_ALIASES, allowed_keys, resolve};
pub use types::*;
