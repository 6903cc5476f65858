//! # memlink-core
//!
//! Foundation utilities shared by every memlink crate:
//!
//! - **Text**: UTF-8 safe truncation, whitespace collapsing, slugs, XML escaping
//! - **Hashing**: SHA-256 hex digests over ordered parts
//! - **JSON**: ordered candidate-field lookup for loosely shaped payloads
//! - **Logging**: `tracing` subscriber setup for binaries

#![deny(unsafe_code)]

pub mod hash;
pub mod json;
pub mod logging;
pub mod text;

pub use hash::{sha256_hex, sha256_hex_parts};
pub use logging::init_subscriber;
