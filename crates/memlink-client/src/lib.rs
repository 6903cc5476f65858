//! # memlink-client
//!
//! Transport layer over the `nmem` memory service.
//!
//! - **CLI transport** ([`CliTransport`]): resolves `nmem` (or the `uvx`
//!   wrapper), runs subcommands with time bounds, parses `--json` output
//! - **HTTP transport** ([`HttpTransport`]): the local/remote REST API
//! - **Fallback** ([`MemoryClient`]): CLI first, API when the CLI reports an
//!   unsupported operation
//! - **Classification** ([`classify`]): one pattern table from error text to
//!   [`ErrorKind`]
//!
//! Consumers depend on the [`MemoryBackend`] trait, not on the concrete client.

#![deny(unsafe_code)]

pub mod cli;
pub mod client;
pub mod errors;
pub mod http;
pub mod runner;
pub mod types;

pub use cli::{CliTimeouts, CliTransport};
pub use client::{MemoryBackend, MemoryClient};
pub use errors::{ClientError, ErrorKind, Result, classify};
pub use http::{HttpTimeouts, HttpTransport};
pub use runner::{CommandRunner, ProcessOutput, RunOptions, TokioCommandRunner};
pub use types::*;
