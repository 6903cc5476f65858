//! # memlink
//!
//! Command-line entry point. Wires config, the memory client, and the
//! policy engine together.
//!
//! Replies go to stdout, logs to stderr.

#![deny(unsafe_code)]

mod hook;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, BufReader};

use memlink_capture::{CaptureEvent, CaptureReason, ThreadCapture};
use memlink_client::{FeedQuery, MemoryClient, ThreadQuery};
use memlink_core::logging::{init_json_subscriber, init_subscriber};
use memlink_memory::commands::{
    self, DEFAULT_SEARCH_LIMIT, DEFAULT_THREAD_PAGE, DEFAULT_THREAD_SEARCH_LIMIT,
};
use memlink_memory::{CommandReply, DedupPolicy, ForgetPolicy, RememberRequest};
use memlink_settings::{ProcessEnv, ResolvedConfig, load_config};

/// Long-term memory for chat agents.
#[derive(Parser, Debug)]
#[command(name = "memlink", version, about = "Long-term memory for chat agents")]
struct Cli {
    /// Log level when `RUST_LOG` is unset.
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Write logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print replies as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Host configuration object (JSON), layered above the config file.
    #[arg(long, global = true)]
    host_config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search memories.
    Search {
        /// Query text.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        /// Maximum results.
        #[arg(long, short = 'n', default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Save a memory.
    Remember {
        /// Text to save.
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        /// Title.
        #[arg(long)]
        title: Option<String>,
        /// Importance in [0, 1].
        #[arg(long)]
        importance: Option<f64>,
        /// Unit type (fact, preference, decision, ...).
        #[arg(long = "type")]
        unit_type: Option<String>,
        /// Label; repeatable.
        #[arg(long = "label")]
        labels: Vec<String>,
        /// Save even when a near-identical memory exists.
        #[arg(long)]
        no_dedup: bool,
        /// Score at which an existing memory counts as a duplicate.
        #[arg(long, default_value_t = DedupPolicy::default().threshold)]
        dedup_threshold: f64,
    },
    /// Delete a memory by id, or by searching for it.
    Forget {
        /// Memory id or search text.
        #[arg(required = true, num_args = 1..)]
        target: Vec<String>,
        /// Minimum top-hit score for deleting without listing candidates.
        #[arg(long, default_value_t = ForgetPolicy::default().threshold)]
        threshold: f64,
    },
    /// Show configuration and backend health.
    Status,
    /// Show one memory.
    Show {
        /// Memory id.
        id: String,
    },
    /// Recent activity.
    Timeline {
        /// Look-back window in days.
        #[arg(long, default_value_t = 7)]
        days: u32,
        /// Only events of this type.
        #[arg(long = "type")]
        event_type: Option<String>,
        /// Include low-signal events.
        #[arg(long)]
        all: bool,
        /// Maximum events.
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Memories connected to one memory.
    Connections {
        /// Memory id.
        id: String,
        /// Hops to expand.
        #[arg(long, default_value_t = 1)]
        depth: u32,
    },
    /// Capture a session transcript (JSONL) into its thread.
    Capture {
        /// Session key the thread id is derived from.
        #[arg(long)]
        session: String,
        /// Transcript file.
        #[arg(long)]
        file: PathBuf,
        /// Source tag stored with a newly created thread.
        #[arg(long)]
        source: Option<String>,
    },
    /// Print the working-memory briefing, or replace it.
    WorkingMemory {
        /// New briefing text.
        #[arg(long)]
        set: Option<String>,
    },
    /// Search and read stored conversations.
    Threads {
        #[command(subcommand)]
        action: ThreadsCommand,
    },
    /// Answer lifecycle events (JSON) from stdin.
    ///
    /// Without `--serve`, one event is read and recall marks and digest
    /// cooldowns last for this invocation only.
    Hook {
        /// Read NDJSON events until EOF with one long-lived engine.
        #[arg(long)]
        serve: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ThreadsCommand {
    /// Search conversations by keyword.
    Search {
        /// Query text.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        /// Maximum threads.
        #[arg(long, short = 'n', default_value_t = DEFAULT_THREAD_SEARCH_LIMIT)]
        limit: usize,
        /// Only threads from this source.
        #[arg(long)]
        source: Option<String>,
    },
    /// Show messages of one conversation.
    Show {
        /// Thread id.
        id: String,
        /// Messages to skip.
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Maximum messages.
        #[arg(long, default_value_t = DEFAULT_THREAD_PAGE)]
        limit: usize,
    },
}

fn print_reply(reply: &CommandReply, as_json: bool) -> Result<ExitCode> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(reply)?);
    } else {
        println!("{}", reply.text);
    }
    Ok(if reply.ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn run(cli: Cli, config: ResolvedConfig) -> Result<ExitCode> {
    let client = Arc::new(MemoryClient::new(&config));
    let as_json = cli.json;

    let reply = match cli.command {
        Command::Search { query, limit } => {
            commands::search(client.as_ref(), &query.join(" "), limit).await
        }
        Command::Remember {
            text,
            title,
            importance,
            unit_type,
            labels,
            no_dedup,
            dedup_threshold,
        } => {
            let req = RememberRequest {
                text: text.join(" "),
                title,
                importance,
                unit_type,
                labels,
            };
            let dedup = DedupPolicy { enabled: !no_dedup, threshold: dedup_threshold };
            commands::remember(client.as_ref(), &req, &dedup).await
        }
        Command::Forget { target, threshold } => {
            commands::forget(client.as_ref(), &target.join(" "), &ForgetPolicy { threshold }).await
        }
        Command::Status => {
            let cli_command = client.cli().resolve_command().await.ok().map(|parts| parts.join(" "));
            commands::status(client.as_ref(), &config, cli_command.as_deref()).await
        }
        Command::Show { id } => commands::show(client.as_ref(), &id).await,
        Command::Timeline { days, event_type, all, limit } => {
            let query = FeedQuery { last_n_days: days, event_type, tier1_only: !all, limit };
            commands::timeline(client.as_ref(), &query).await
        }
        Command::Connections { id, depth } => {
            commands::connections(client.as_ref(), &id, depth).await
        }
        Command::Capture { session, file, source } => {
            return run_capture(client, session, file, source, as_json).await;
        }
        Command::WorkingMemory { set: Some(text) } => {
            commands::update_working_memory(client.as_ref(), &text).await
        }
        Command::WorkingMemory { set: None } => commands::working_memory(client.as_ref()).await,
        Command::Threads { action: ThreadsCommand::Search { query, limit, source } } => {
            let query = ThreadQuery { query: query.join(" "), limit, source };
            commands::thread_search(client.as_ref(), &query).await
        }
        Command::Threads { action: ThreadsCommand::Show { id, offset, limit } } => {
            commands::thread_show(client.as_ref(), &id, offset, limit).await
        }
        Command::Hook { serve: true } => {
            let engine = hook::build_engine(client, config);
            let _ = hook::serve(&engine, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
            return Ok(ExitCode::SUCCESS);
        }
        Command::Hook { serve: false } => {
            let mut input = String::new();
            let _ = tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("failed to read stdin")?;
            let reply = hook::run_hook(client, config, &input).await?;
            println!("{}", serde_json::to_string(&reply)?);
            return Ok(ExitCode::SUCCESS);
        }
    };
    print_reply(&reply, as_json)
}

async fn run_capture(
    client: Arc<MemoryClient>,
    session: String,
    file: PathBuf,
    source: Option<String>,
    as_json: bool,
) -> Result<ExitCode> {
    let mut capture = ThreadCapture::new(client);
    if let Some(source) = source {
        capture = capture.with_source(source);
    }
    let event = CaptureEvent::from_session_file(session, file);
    let outcome = capture
        .try_append_or_create(&event, CaptureReason::Manual)
        .await
        .context("capture failed")?;

    let summary = match &outcome {
        Some(o) => json!({
            "threadId": o.thread_id,
            "state": o.state,
            "messages": o.normalized.len(),
            "messagesAdded": o.messages_added,
        }),
        None => Value::Null,
    };
    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if let Some(o) = &outcome {
        println!(
            "Captured {} new message(s) into {} ({}).",
            o.messages_added,
            o.thread_id,
            summary["state"].as_str().unwrap_or_default()
        );
    } else {
        println!("Nothing to capture.");
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    if cli.json_logs {
        init_json_subscriber(&cli.log_level);
    } else {
        init_subscriber(&cli.log_level);
    }

    let host: Option<Value> = cli
        .host_config
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .context("--host-config is not valid JSON")?;
    let config = load_config(host.as_ref(), &ProcessEnv).context("invalid host configuration")?;
    run(cli, config).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
