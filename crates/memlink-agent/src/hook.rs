//! Host hook entry point.
//!
//! One-shot mode reads a single lifecycle event and builds an engine for it,
//! so recall marks and digest cooldowns last one invocation only. Serve mode
//! keeps one engine for the whole process and answers NDJSON events on stdin
//! with one reply line each, in order.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use memlink_client::MemoryBackend;
use memlink_memory::{ConfigReload, EngineOutcome, LifecycleEvent, PolicyEngine, guidance_block};
use memlink_settings::{ProcessEnv, ResolvedConfig, load_config};

/// What the hook prints to stdout.
#[derive(Debug, Serialize)]
pub struct HookReply {
    /// What the engine did.
    pub outcome: EngineOutcome,
    /// Behavioural guidance for the host to prepend; only on `beforeTurn`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance: Option<&'static str>,
}

/// Reload from the config file and environment, with the host layer on top.
fn file_reload() -> ConfigReload {
    Arc::new(|host: Option<&Value>| load_config(host, &ProcessEnv))
}

/// Engine used by both hook modes.
pub fn build_engine(backend: Arc<dyn MemoryBackend>, config: ResolvedConfig) -> PolicyEngine {
    PolicyEngine::new(backend, config).with_reload(file_reload())
}

/// Run one parsed event through `engine`.
pub async fn handle_event(engine: &PolicyEngine, event: LifecycleEvent) -> HookReply {
    tracing::debug!(event = event.name(), "hook invoked");
    let before_turn = matches!(event, LifecycleEvent::BeforeTurn { .. });
    let outcome = engine.handle(event).await;
    // read after handling so a settings change in this event is not stale
    let guidance = before_turn.then(|| guidance_block(engine.config().session_context));
    HookReply { outcome, guidance }
}

/// Parse one lifecycle event and run it through a fresh engine.
pub async fn run_hook(
    backend: Arc<dyn MemoryBackend>,
    config: ResolvedConfig,
    input: &str,
) -> Result<HookReply> {
    let event: LifecycleEvent =
        serde_json::from_str(input.trim()).context("stdin is not a valid lifecycle event")?;
    let engine = build_engine(backend, config);
    Ok(handle_event(&engine, event).await)
}

/// Answer NDJSON lifecycle events until EOF. Returns the number of events handled.
///
/// Blank lines are ignored. A line that is not a lifecycle event gets an
/// `{"error": ...}` reply and the loop continues.
pub async fn serve<R, W>(engine: &PolicyEngine, reader: R, mut writer: W) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut handled = 0usize;
    while let Some(line) = lines.next_line().await.context("failed to read hook input")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<LifecycleEvent>(line) {
            Ok(event) => {
                handled += 1;
                serde_json::to_string(&handle_event(engine, event).await)?
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed hook line");
                json!({"error": format!("not a valid lifecycle event: {e}")}).to_string()
            }
        };
        writer.write_all(reply.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    tracing::debug!(handled, "hook input closed");
    Ok(handled)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
