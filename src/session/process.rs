// src/session/process.rs

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use futures::future::BoxFuture;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::{ProvisionError, Result};
use crate::exec::backend::{drain_until, push_line, shell_command, spawn_line_reader};
use crate::types::CommandOutcome;

/// A running process that is driven prompt by prompt.
pub trait InteractiveSession: Send {
    /// Wait until the output produced so far matches `pattern` and return the
    /// matched text. Fails with `PromptNotObserved` if the process ends or
    /// `timeout` elapses first.
    fn expect<'a>(&'a mut self, pattern: &'a Regex, timeout: Duration)
    -> BoxFuture<'a, Result<String>>;

    /// Write `line` plus a newline to the process's stdin.
    fn send_line<'a>(&'a mut self, line: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Close stdin and wait for the process to exit.
    fn finish(&mut self, timeout: Duration) -> BoxFuture<'_, Result<CommandOutcome>>;
}

/// Starts interactive sessions. Tests provide a scripted implementation.
pub trait SessionSpawner: Send + Sync {
    fn spawn(&self, command: &str) -> Result<Box<dyn InteractiveSession>>;
}

/// Spawns real `sh -c` processes with piped stdin.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    work_dir: PathBuf,
}

impl ProcessSpawner {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }
}

impl SessionSpawner for ProcessSpawner {
    fn spawn(&self, command: &str) -> Result<Box<dyn InteractiveSession>> {
        let session = ProcessSession::spawn(command, &self.work_dir)?;
        Ok(Box::new(session))
    }
}

/// An interactive child process with merged stdout/stderr.
///
/// Output is accumulated into a transcript; `expect` searches the part of
/// the transcript after the previous match.
pub struct ProcessSession {
    command: String,
    child: Child,
    stdin: Option<ChildStdin>,
    output_rx: mpsc::UnboundedReceiver<String>,
    transcript: String,
    cursor: usize,
}

impl ProcessSession {
    pub fn spawn(command: &str, work_dir: &std::path::Path) -> Result<Self> {
        let mut child = shell_command(command)
            .current_dir(work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning interactive `{command}`"))?;

        let (tx, output_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, tx);
        }
        let stdin = child.stdin.take();

        debug!(command = %command, pid = ?child.id(), "interactive session started");

        Ok(Self {
            command: command.to_string(),
            child,
            stdin,
            output_rx,
            transcript: String::new(),
            cursor: 0,
        })
    }

    fn push_line(&mut self, line: &str) {
        push_line(&mut self.transcript, line);
    }
}

impl InteractiveSession for ProcessSession {
    fn expect<'a>(
        &'a mut self,
        pattern: &'a Regex,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let deadline = Instant::now() + timeout;
            loop {
                if let Some(m) = pattern.find(&self.transcript[self.cursor..]) {
                    let matched = m.as_str().to_string();
                    self.cursor += m.end();
                    return Ok(matched);
                }

                match tokio::time::timeout_at(deadline, self.output_rx.recv()).await {
                    Ok(Some(line)) => self.push_line(&line),
                    Ok(None) | Err(_) => {
                        warn!(
                            command = %self.command,
                            pattern = %pattern,
                            "expected prompt never appeared"
                        );
                        return Err(ProvisionError::PromptNotObserved {
                            pattern: pattern.to_string(),
                        });
                    }
                }
            }
        })
    }

    fn send_line<'a>(&'a mut self, line: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let stdin = self
                .stdin
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("stdin of `{}` already closed", self.command))?;
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await?;
            Ok(())
        })
    }

    fn finish(&mut self, timeout: Duration) -> BoxFuture<'_, Result<CommandOutcome>> {
        Box::pin(async move {
            drop(self.stdin.take());

            let deadline = Instant::now() + timeout;
            let status = match tokio::time::timeout_at(deadline, self.child.wait()).await {
                Ok(res) => {
                    let status = res.with_context(|| format!("waiting for `{}`", self.command))?;
                    if !drain_until(deadline, &mut self.output_rx, &mut self.transcript).await {
                        warn!(command = %self.command, "output still open after exit");
                    }
                    status.code()
                }
                Err(_) => {
                    warn!(command = %self.command, "interactive session did not exit in time; killing it");
                    let _ = self.child.kill().await;
                    while let Ok(line) = self.output_rx.try_recv() {
                        self.push_line(&line);
                    }
                    None
                }
            };

            debug!(command = %self.command, ?status, "interactive session finished");
            Ok(CommandOutcome::new(status, self.transcript.clone()))
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expect_then_answer_prompt() {
        let mut session = ProcessSession::spawn(
            "echo 'visit https://example.test/auth?x=1'; read token; echo got:$token",
            std::path::Path::new("."),
        )
        .unwrap();

        let pattern = Regex::new(r"https://example\.test/auth\?.*").unwrap();
        let url = session.expect(&pattern, Duration::from_secs(5)).await.unwrap();
        assert_eq!(url, "https://example.test/auth?x=1");

        session.send_line("abc123").await.unwrap();
        let outcome = session.finish(Duration::from_secs(5)).await.unwrap();

        assert!(outcome.success());
        assert!(outcome.output.contains("got:abc123"));
    }

    #[tokio::test]
    async fn process_exit_without_prompt_is_reported() {
        let mut session =
            ProcessSession::spawn("echo nothing to see", std::path::Path::new(".")).unwrap();
        let pattern = Regex::new(r"https://.*").unwrap();

        let err = session.expect(&pattern, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ProvisionError::PromptNotObserved { .. }));
    }

    #[tokio::test]
    async fn finish_respects_the_timeout_when_output_stays_open() {
        let mut session = ProcessSession::spawn(
            "read code; sleep 5 & echo bye",
            std::path::Path::new("."),
        )
        .unwrap();
        session.send_line("x").await.unwrap();

        let started = std::time::Instant::now();
        let outcome = session.finish(Duration::from_millis(500)).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
        assert_eq!(outcome.status, Some(0));
        assert!(outcome.output.contains("bye"));
    }
}
