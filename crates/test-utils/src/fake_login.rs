use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use regex::Regex;

use cloudstrap::errors::{ProvisionError, Result};
use cloudstrap::session::{InteractiveSession, SessionSpawner};
use cloudstrap::types::CommandOutcome;

pub const FAKE_LOGIN_URL: &str =
    "https://accounts.google.com/o/oauth2/auth?response_type=code&client_id=fake";

/// How spawned fake sessions behave.
#[derive(Debug, Clone)]
pub enum LoginScript {
    /// Print the sign-in URL, then exit with `status` once a line is sent.
    PrintsUrl { status: i32 },
    /// Never print anything matching.
    Silent,
}

/// Spawns scripted login sessions and records every token they receive.
#[derive(Clone)]
pub struct FakeSpawner {
    script: LoginScript,
    spawned: Arc<Mutex<Vec<String>>>,
    tokens: Arc<Mutex<Vec<String>>>,
}

impl FakeSpawner {
    pub fn new(script: LoginScript) -> Self {
        Self {
            script,
            spawned: Arc::new(Mutex::new(Vec::new())),
            tokens: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(LoginScript::PrintsUrl { status: 0 })
    }

    /// Commands that were spawned, in order.
    pub fn spawned(&self) -> Vec<String> {
        self.spawned.lock().unwrap().clone()
    }

    /// Lines written to any session's stdin, in order.
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

impl SessionSpawner for FakeSpawner {
    fn spawn(&self, command: &str) -> Result<Box<dyn InteractiveSession>> {
        self.spawned.lock().unwrap().push(command.to_string());
        Ok(Box::new(FakeSession {
            script: self.script.clone(),
            tokens: self.tokens.clone(),
            sent: false,
        }))
    }
}

struct FakeSession {
    script: LoginScript,
    tokens: Arc<Mutex<Vec<String>>>,
    sent: bool,
}

impl InteractiveSession for FakeSession {
    fn expect<'a>(
        &'a mut self,
        pattern: &'a Regex,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let transcript = match self.script {
                LoginScript::PrintsUrl { .. } => {
                    format!("Go to the following link in your browser:\n\n    {FAKE_LOGIN_URL}\n\nEnter verification code: ")
                }
                LoginScript::Silent => String::new(),
            };
            pattern
                .find(&transcript)
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| ProvisionError::PromptNotObserved {
                    pattern: pattern.to_string(),
                })
        })
    }

    fn send_line<'a>(&'a mut self, line: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.tokens.lock().unwrap().push(line.to_string());
            self.sent = true;
            Ok(())
        })
    }

    fn finish(&mut self, _timeout: Duration) -> BoxFuture<'_, Result<CommandOutcome>> {
        Box::pin(async move {
            let status = match (&self.script, self.sent) {
                (LoginScript::PrintsUrl { status }, true) => *status,
                _ => 1,
            };
            Ok(CommandOutcome::new(Some(status), "You are now logged in"))
        })
    }
}
