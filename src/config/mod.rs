// src/config/mod.rs

//! Configuration loading and validation for cloudstrap.
//!
//! Responsibilities:
//! - Define the TOML-backed data model and its validated form (`model.rs`).
//! - Load a config file from disk, falling back to built-in defaults (`loader.rs`).
//! - Convert and validate durations, patterns and lists (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{
    BackendSection, ConfigFile, FrontendSection, JobSection, LoginSettings, PipelineSettings,
    RawConfigFile, RawLoginSection, RawPipelineSection, RawRetrySection, RawServerSection,
    RetrySettings, ServerSettings,
};
pub use validate::parse_duration;
