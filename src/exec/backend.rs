// src/exec/backend.rs

//! Pluggable command runner abstraction.
//!
//! Everything above this layer talks to a `CommandRunner` instead of
//! spawning processes itself, so tests can script exit statuses and output
//! without touching a shell.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use futures::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::CommandOutcome;

/// Trait abstracting how one command line is executed.
///
/// Implementations return `Err` only when the command could not be run at
/// all; a command that ran and failed is an `Ok` outcome with a non-zero
/// status.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        command: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<CommandOutcome>>;
}

/// Real runner used in production: `sh -c <command>` in a fixed working
/// directory, stdout and stderr merged line by line in arrival order.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    work_dir: PathBuf,
}

impl ShellRunner {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }
}

impl CommandRunner for ShellRunner {
    fn run<'a>(
        &'a self,
        command: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<CommandOutcome>> {
        Box::pin(async move {
            let mut child = shell_command(command)
                .current_dir(&self.work_dir)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .with_context(|| format!("spawning `{command}`"))?;

            let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
            if let Some(stdout) = child.stdout.take() {
                spawn_line_reader(stdout, line_tx.clone());
            }
            if let Some(stderr) = child.stderr.take() {
                spawn_line_reader(stderr, line_tx.clone());
            }
            drop(line_tx);

            let deadline = Instant::now() + timeout;
            let mut output = String::new();
            let status = match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(res) => {
                    let status = res.with_context(|| format!("waiting for `{command}`"))?;
                    if !drain_until(deadline, &mut line_rx, &mut output).await {
                        warn!(
                            command = %command,
                            "output still open after exit; a background process holds it"
                        );
                    }
                    status.code()
                }
                Err(_) => {
                    warn!(command = %command, ?timeout, "command timed out; killing it");
                    if let Err(e) = child.kill().await {
                        warn!(command = %command, error = %e, "failed to kill timed out command");
                    }
                    // Grandchildren may still hold the pipes open, so only
                    // take what has already arrived.
                    while let Ok(line) = line_rx.try_recv() {
                        push_line(&mut output, &line);
                    }
                    None
                }
            };

            debug!(command = %command, ?status, "command finished");
            Ok(CommandOutcome::new(status, output))
        })
    }
}

/// Build a shell command appropriate for the platform.
pub(crate) fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    }
}

/// Forward every line of `reader` into `tx`, logging it at debug.
///
/// Bytes that are not UTF-8 are replaced rather than ending the read; the
/// pipe is drained to EOF even once nobody listens, so the child never
/// sees a closed pipe.
pub(crate) fn spawn_line_reader<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = decode_line(&buf);
                    debug!("output: {}", line);
                    // Keep reading after the receiver is gone.
                    let _ = tx.send(line);
                }
                Err(e) => {
                    debug!(error = %e, "output pipe read failed");
                    break;
                }
            }
        }
    });
}

/// Collect lines until every sender is gone or `deadline` passes, then take
/// whatever is already queued. Returns `false` when the deadline cut it
/// short.
pub(crate) async fn drain_until(
    deadline: Instant,
    rx: &mut mpsc::UnboundedReceiver<String>,
    output: &mut String,
) -> bool {
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(line)) => push_line(output, &line),
            Ok(None) => return true,
            Err(_) => {
                while let Ok(line) = rx.try_recv() {
                    push_line(output, &line);
                }
                return false;
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

pub(crate) fn push_line(output: &mut String, line: &str) {
    output.push_str(line);
    output.push('\n');
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_output_and_status_of_both_streams() {
        let runner = ShellRunner::new(".");
        let outcome = runner
            .run("echo out; echo err 1>&2; exit 3", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.status, Some(3));
        assert!(outcome.output.contains("out\n"));
        assert!(outcome.output.contains("err\n"));
    }

    #[tokio::test]
    async fn runs_in_the_configured_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();

        let runner = ShellRunner::new(dir.path());
        let outcome = runner.run("cat marker.txt", Duration::from_secs(5)).await.unwrap();

        assert!(outcome.success());
        assert_eq!(outcome.output, "here\n");
    }

    #[tokio::test]
    async fn timeout_kills_the_command() {
        let runner = ShellRunner::new(".");
        let outcome = runner.run("sleep 5", Duration::from_millis(100)).await.unwrap();

        assert_eq!(outcome.status, None);
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn background_process_holding_output_does_not_outlive_the_timeout() {
        let runner = ShellRunner::new(".");
        let started = std::time::Instant::now();
        let outcome = runner
            .run("sleep 5 & echo hi", Duration::from_millis(500))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
        assert_eq!(outcome.status, Some(0));
        assert!(outcome.output.contains("hi\n"));
    }

    #[tokio::test]
    async fn invalid_utf8_output_is_kept_and_does_not_fail_the_command() {
        let runner = ShellRunner::new(".");
        let outcome = runner
            .run(
                "printf 'a\\377b\\n'; echo 'created key [abc123]'",
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert!(outcome.success(), "status {:?}", outcome.status);
        assert!(outcome.output.contains("a\u{FFFD}b\n"));
        assert!(outcome.output.contains("created key [abc123]"));
    }

    #[test]
    fn line_endings_are_stripped() {
        assert_eq!(decode_line(b"plain\n"), "plain");
        assert_eq!(decode_line(b"crlf\r\n"), "crlf");
        assert_eq!(decode_line(b"last"), "last");
    }
}
