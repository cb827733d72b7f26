// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`backend`] provides the `CommandRunner` trait and the production
//!   `ShellRunner`, which runs one command line through `sh -c` to
//!   completion. Tests replace it with a scripted fake.
//! - [`retry`] wraps a runner with the bounded, fixed-backoff retry policy
//!   every provisioning step relies on.

pub mod backend;
pub mod retry;

pub use backend::{CommandRunner, ShellRunner};
pub use retry::RetryExecutor;
