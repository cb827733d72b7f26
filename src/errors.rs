// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A command kept failing until the retry budget ran out.
    #[error("command exceeded retry count ({attempts} attempts): {command}")]
    RetryExhausted { command: String, attempts: u32 },

    /// The platform-managed service identity never showed up while polling.
    #[error("service account {0} was never created")]
    IdentityNeverCreated(String),

    /// A command succeeded but its output lacked an expected value.
    #[error("expected {what} not found in command output")]
    ParseError { what: &'static str },

    #[error("login prompt matching {pattern:?} was not observed")]
    PromptNotObserved { pattern: String },

    /// A project name that is not a valid project id. Nothing is run for it.
    #[error("invalid project id: {0:?}")]
    InvalidProjectId(String),

    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ProvisionError>;
