#![allow(dead_code)]

use std::path::Path;

use cloudstrap::config::{ConfigFile, JobSection, RawConfigFile};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the shipped defaults with the retry backoff and heartbeat
/// shortened so tests do not sleep.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        config.retry.backoff = "0ms".to_string();
        config.server.keep_alive_interval = "10ms".to_string();
        config.login.prompt_timeout = "2s".to_string();
        config.login.exit_timeout = "2s".to_string();
        Self { config }
    }

    pub fn with_work_dir(mut self, dir: &Path) -> Self {
        self.config.pipeline.work_dir = dir.to_path_buf();
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    pub fn with_queues(mut self, queues: &[&str]) -> Self {
        self.config.pipeline.queues = queues.iter().map(|q| q.to_string()).collect();
        self
    }

    pub fn with_jobs(mut self, jobs: Vec<JobSection>) -> Self {
        self.config.pipeline.jobs = jobs;
        self
    }

    pub fn with_login_command(mut self, command: &str) -> Self {
        self.config.login.command = command.to_string();
        self
    }

    pub fn with_url_pattern(mut self, pattern: &str) -> Self {
        self.config.login.url_pattern = pattern.to_string();
        self
    }

    pub fn with_prompt_timeout(mut self, timeout: &str) -> Self {
        self.config.login.prompt_timeout = timeout.to_string();
        self
    }

    pub fn with_session_ttl(mut self, ttl: &str) -> Self {
        self.config.login.session_ttl = ttl.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
