use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use cloudstrap::errors::{ProvisionError, Result};
use cloudstrap::exec::CommandRunner;
use cloudstrap::types::CommandOutcome;

/// A fake command runner that:
/// - records every command line it is asked to run, in order
/// - answers from scripted responses keyed by command prefix
/// - succeeds with empty output for anything unscripted.
///
/// For each rule, queued one-shot responses are used first, then the
/// sticky response (if any). The first rule whose prefix matches wins.
/// A reply is either an outcome or a failure to start the command at all.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    rules: Vec<Rule>,
    calls: Vec<String>,
}

#[derive(Clone)]
enum Reply {
    Outcome(CommandOutcome),
    SpawnError,
}

struct Rule {
    prefix: String,
    queued: VecDeque<Reply>,
    sticky: Option<Reply>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call starting with `prefix` returns `outcome` (after any queued ones).
    pub fn always(&self, prefix: &str, outcome: CommandOutcome) -> &Self {
        self.with_rule(prefix, |rule| rule.sticky = Some(Reply::Outcome(outcome)));
        self
    }

    /// The next call starting with `prefix` returns `outcome`.
    pub fn once(&self, prefix: &str, outcome: CommandOutcome) -> &Self {
        self.with_rule(prefix, |rule| rule.queued.push_back(Reply::Outcome(outcome)));
        self
    }

    /// The next `times` calls starting with `prefix` exit with status 1.
    pub fn fail_times(&self, prefix: &str, times: usize) -> &Self {
        for _ in 0..times {
            self.once(prefix, failure(""));
        }
        self
    }

    /// Every call starting with `prefix` succeeds with `output`.
    pub fn succeed_with(&self, prefix: &str, output: &str) -> &Self {
        self.always(prefix, success(output))
    }

    /// Every call starting with `prefix` exits with status 1.
    pub fn always_fail(&self, prefix: &str) -> &Self {
        self.always(prefix, failure(""))
    }

    /// Every call starting with `prefix` fails to start.
    pub fn fail_to_spawn(&self, prefix: &str) -> &Self {
        self.with_rule(prefix, |rule| rule.sticky = Some(Reply::SpawnError));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    fn with_rule(&self, prefix: &str, f: impl FnOnce(&mut Rule)) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(rule) = inner.rules.iter_mut().find(|r| r.prefix == prefix) {
            f(rule);
            return;
        }
        let mut rule = Rule {
            prefix: prefix.to_string(),
            queued: VecDeque::new(),
            sticky: None,
        };
        f(&mut rule);
        inner.rules.push(rule);
    }

    fn respond(&self, command: &str) -> Reply {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(command.to_string());

        for rule in inner.rules.iter_mut() {
            if !command.starts_with(&rule.prefix) {
                continue;
            }
            if let Some(outcome) = rule.queued.pop_front() {
                return outcome;
            }
            if let Some(outcome) = &rule.sticky {
                return outcome.clone();
            }
        }
        Reply::Outcome(success(""))
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(
        &'a self,
        command: &'a str,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<CommandOutcome>> {
        let reply = self.respond(command);
        Box::pin(async move {
            match reply {
                Reply::Outcome(outcome) => Ok(outcome),
                Reply::SpawnError => Err(ProvisionError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("cannot start `{command}`"),
                ))),
            }
        })
    }
}

pub fn success(output: &str) -> CommandOutcome {
    CommandOutcome::new(Some(0), output)
}

pub fn failure(output: &str) -> CommandOutcome {
    CommandOutcome::new(Some(1), output)
}

impl ScriptedRunner {
    /// A runner whose outputs let every pipeline step for `project` succeed
    /// with nothing pre-existing.
    pub fn happy_path(project: &str) -> Self {
        let runner = Self::new();
        runner
            .succeed_with(
                "gcloud beta billing accounts list",
                "[billing]\nname = billingAccounts/0X0X0X-0X0X0X-0X0X0X\nopen = True\n",
            )
            .succeed_with(
                "gcloud iam service-accounts list",
                &format!("DISPLAY NAME  EMAIL\nApp Engine default service account  {project}@appspot.gserviceaccount.com\n"),
            )
            .succeed_with(
                "gcloud iam service-accounts keys create",
                &format!("created key [a1b2c3d4e5] of type [json] as [service-account-creds.json] for [{project}@appspot.gserviceaccount.com]"),
            )
            .succeed_with("git -C", "4f2a9c1e8b7d6a5f4e3d2c1b0a9f8e7d6c5b4a39\n")
            .always_fail("gcloud app versions list");
        runner
    }
}
