// src/exec/retry.rs

//! Bounded retry with a fixed backoff.
//!
//! The operations being retried mostly wait on cloud-side propagation with
//! a roughly constant delay, so the backoff neither grows nor jitters.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::RetrySettings;
use crate::errors::{ProvisionError, Result};
use crate::exec::CommandRunner;
use crate::types::CommandOutcome;

/// Runs commands through a [`CommandRunner`] until one attempt exits with
/// status zero or the attempt budget is spent.
#[derive(Clone)]
pub struct RetryExecutor {
    runner: Arc<dyn CommandRunner>,
    settings: RetrySettings,
}

impl RetryExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>, settings: RetrySettings) -> Self {
        Self { runner, settings }
    }

    pub fn settings(&self) -> &RetrySettings {
        &self.settings
    }

    /// The underlying runner, for one-shot checks that must not be retried.
    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    /// [`execute`](Self::execute) with the configured default timeout.
    pub async fn run(&self, command: &str) -> Result<String> {
        self.execute(command, self.settings.command_timeout).await
    }

    /// Execute `command` up to `max_attempts` times and return the output of
    /// the first successful attempt.
    ///
    /// Non-zero statuses, timeouts and spawn failures are all treated as a
    /// failed attempt. Fails with [`ProvisionError::RetryExhausted`] once the
    /// budget is spent; no attempt is made beyond it.
    pub async fn execute(&self, command: &str, timeout: Duration) -> Result<String> {
        let max_attempts = self.settings.max_attempts;

        for attempt in 1..=max_attempts {
            info!(command = %command, attempt, max_attempts, "executing command");

            match self.runner.run(command, timeout).await {
                Ok(CommandOutcome { status: Some(0), output }) => return Ok(output),
                Ok(outcome) => {
                    warn!(
                        command = %command,
                        attempt,
                        status = ?outcome.status,
                        "command failed"
                    );
                }
                Err(e) => {
                    warn!(command = %command, attempt, error = %e, "command could not be run");
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.settings.backoff).await;
            }
        }

        Err(ProvisionError::RetryExhausted {
            command: command.to_string(),
            attempts: max_attempts,
        })
    }
}
