//! Subprocess execution.
//!
//! [`CommandRunner`] is the seam between the CLI transport and the operating
//! system. The real implementation spawns the program directly (no shell), so
//! arguments are never re-parsed and nothing secret needs quoting.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{ClientError, Result};

/// Options for one subprocess run.
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Hard time bound; the child is killed when exceeded.
    pub timeout: Duration,
    /// Extra environment for the child. Values are never logged.
    pub env: Vec<(String, String)>,
    /// Cancels the run early.
    pub cancellation: CancellationToken,
}

impl RunOptions {
    /// Options with the given timeout and no extra environment.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            env: Vec::new(),
            cancellation: CancellationToken::new(),
        }
    }
}

/// Captured output of a finished subprocess.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Exit code (`-1` when killed by a signal).
    pub exit_code: i32,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// The run hit its timeout.
    pub timed_out: bool,
    /// The run was cancelled.
    pub interrupted: bool,
}

impl ProcessOutput {
    /// Exited with status 0, not timed out, not interrupted.
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out && !self.interrupted
    }
}

/// Runs external programs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, stdin closed, stdout/stderr captured.
    ///
    /// Timeouts and cancellation are reported in [`ProcessOutput`], not as
    /// errors. Only a failure to spawn or wait is an `Err`.
    async fn run(&self, program: &str, args: &[String], opts: &RunOptions) -> Result<ProcessOutput>;
}

/// Real subprocess execution backed by `tokio::process::Command`.
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[String], opts: &RunOptions) -> Result<ProcessOutput> {
        let start = Instant::now();

        let mut cmd = tokio::process::Command::new(program);
        let _ = cmd
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &opts.env {
            let _ = cmd.env(key, value);
        }

        // Argument values can hold user content; only the shape is logged.
        debug!(program, arg_count = args.len(), "spawning process");

        let child = cmd
            .spawn()
            .map_err(|e| ClientError::Spawn(format!("{program}: {e}")))?;

        let elapsed_ms = |start: Instant| u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let timeout_ms = u64::try_from(opts.timeout.as_millis()).unwrap_or(u64::MAX);

        // Dropping the wait future drops the child, which kills it (kill_on_drop).
        let output = tokio::select! {
            result = child.wait_with_output() => {
                result.map_err(|e| ClientError::Spawn(format!("{program}: wait failed: {e}")))?
            }
            () = tokio::time::sleep(opts.timeout) => {
                warn!(program, timeout_ms, "process timed out");
                return Ok(ProcessOutput {
                    stderr: "Process timed out".into(),
                    exit_code: -1,
                    duration_ms: elapsed_ms(start),
                    timed_out: true,
                    ..ProcessOutput::default()
                });
            }
            () = opts.cancellation.cancelled() => {
                debug!(program, "process cancelled");
                return Ok(ProcessOutput {
                    stderr: "Process cancelled".into(),
                    exit_code: -1,
                    duration_ms: elapsed_ms(start),
                    interrupted: true,
                    ..ProcessOutput::default()
                });
            }
        };

        let duration_ms = elapsed_ms(start);
        let exit_code = output.status.code().unwrap_or(-1);
        debug!(program, exit_code, duration_ms, "process completed");

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
            duration_ms,
            timed_out: false,
            interrupted: false,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> RunOptions {
        RunOptions::with_timeout(Duration::from_secs(10))
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn run_echo() {
        let out = TokioCommandRunner.run("echo", &args(&["hello"]), &opts()).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn arguments_are_not_shell_expanded() {
        let out = TokioCommandRunner
            .run("echo", &args(&["$HOME", "a;b"]), &opts())
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "$HOME a;b");
    }

    #[tokio::test]
    async fn run_exit_code() {
        let out = TokioCommandRunner.run("sh", &args(&["-c", "exit 42"]), &opts()).await.unwrap();
        assert_eq!(out.exit_code, 42);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn env_is_injected() {
        let mut o = opts();
        o.env.push(("NMEM_API_KEY".into(), "k-123".into()));
        let out = TokioCommandRunner
            .run("sh", &args(&["-c", "printf %s \"$NMEM_API_KEY\""]), &o)
            .await
            .unwrap();
        assert_eq!(out.stdout, "k-123");
    }

    #[tokio::test]
    async fn captures_stderr() {
        let out = TokioCommandRunner
            .run("sh", &args(&["-c", "echo err >&2"]), &opts())
            .await
            .unwrap();
        assert_eq!(out.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let o = RunOptions::with_timeout(Duration::from_millis(50));
        let out = TokioCommandRunner.run("sleep", &args(&["10"]), &o).await.unwrap();
        assert!(out.timed_out);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn cancellation_is_reported() {
        let o = opts();
        let cancel = o.cancellation.clone();
        let handle = tokio::spawn(async move { TokioCommandRunner.run("sleep", &args(&["10"]), &o).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let out = handle.await.unwrap().unwrap();
        assert!(out.interrupted);
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = TokioCommandRunner
            .run("definitely-not-a-real-binary-xyz", &[], &opts())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Spawn(_)));
    }
}
