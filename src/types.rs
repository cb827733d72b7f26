use std::fmt;

use serde::Serialize;

/// Exit status plus combined stdout/stderr of one finished command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutcome {
    /// `None` when the process was killed (signal or timeout).
    pub status: Option<i32>,
    pub output: String,
}

impl CommandOutcome {
    pub fn new(status: Option<i32>, output: impl Into<String>) -> Self {
        Self {
            status,
            output: output.into(),
        }
    }

    /// A command succeeds iff it exited with status exactly zero.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// What a pipeline step does when one of its operations fails.
///
/// - `Fatal`: abort the run (default for almost every step).
/// - `RecoverAsEmpty`: a failed *listing* is treated as an empty listing.
/// - `BestEffort`: the step's failure is logged and the run continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnError {
    Fatal,
    RecoverAsEmpty,
    BestEffort,
}

impl fmt::Display for OnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OnError::Fatal => "fatal",
            OnError::RecoverAsEmpty => "recover-as-empty",
            OnError::BestEffort => "best-effort",
        };
        f.write_str(s)
    }
}

/// Opaque identifier of one interactive login attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        SessionId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        SessionId(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
