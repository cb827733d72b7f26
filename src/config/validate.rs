// src/config/validate.rs

use std::time::Duration;

use regex::Regex;

use crate::config::model::{
    ConfigFile, LoginSettings, PipelineSettings, RawConfigFile, RawPipelineSection,
    RetrySettings, ServerSettings,
};
use crate::errors::{ProvisionError, Result};
use crate::pipeline::names::validate_project_id;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ProvisionError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let server = ServerSettings {
            port: raw.server.port,
            keep_alive_interval: duration_field("server.keep_alive_interval", &raw.server.keep_alive_interval)?,
        };

        if raw.retry.max_attempts == 0 {
            return Err(ProvisionError::ConfigError(
                "[retry].max_attempts must be >= 1 (got 0)".to_string(),
            ));
        }
        let retry = RetrySettings {
            max_attempts: raw.retry.max_attempts,
            backoff: duration_field("retry.backoff", &raw.retry.backoff)?,
            command_timeout: duration_field("retry.command_timeout", &raw.retry.command_timeout)?,
        };

        let url_pattern = Regex::new(&raw.login.url_pattern).map_err(|e| {
            ProvisionError::ConfigError(format!("[login].url_pattern is not a valid regex: {e}"))
        })?;
        let login = LoginSettings {
            command: non_empty("login.command", raw.login.command)?,
            url_pattern,
            prompt_timeout: duration_field("login.prompt_timeout", &raw.login.prompt_timeout)?,
            exit_timeout: duration_field("login.exit_timeout", &raw.login.exit_timeout)?,
            session_ttl: duration_field("login.session_ttl", &raw.login.session_ttl)?,
        };

        let pipeline = validate_pipeline(raw.pipeline)?;

        Ok(ConfigFile {
            server,
            retry,
            login,
            pipeline,
        })
    }
}

fn validate_pipeline(raw: RawPipelineSection) -> Result<PipelineSettings> {
    let project_prefix = non_empty("pipeline.project_prefix", raw.project_prefix)?;
    // Generated names are `<prefix>-<unix seconds>`.
    if validate_project_id(&format!("{project_prefix}-1000000000")).is_err() {
        return Err(ProvisionError::ConfigError(format!(
            "[pipeline].project_prefix '{project_prefix}' does not yield valid project ids"
        )));
    }
    let region = non_empty("pipeline.region", raw.region)?;
    let credentials_file = non_empty("pipeline.credentials_file", raw.credentials_file)?;

    for (field, list) in [
        ("pipeline.queues", &raw.queues),
        ("pipeline.services", &raw.services),
        ("pipeline.roles", &raw.roles),
    ] {
        if list.iter().any(|s| s.trim().is_empty()) {
            return Err(ProvisionError::ConfigError(format!(
                "[{field}] must not contain empty names"
            )));
        }
    }

    for job in raw.jobs.iter() {
        if job.name.trim().is_empty() {
            return Err(ProvisionError::ConfigError(
                "[[pipeline.jobs]] entries must have a name".to_string(),
            ));
        }
    }

    if raw.backend.secret == raw.frontend.secret {
        return Err(ProvisionError::ConfigError(format!(
            "backend and frontend must record provenance in different secrets (both use '{}')",
            raw.backend.secret
        )));
    }

    Ok(PipelineSettings {
        project_prefix,
        project_display_name: raw.project_display_name,
        region,
        bucket_location: raw.bucket_location,
        work_dir: raw.work_dir,
        credentials_file,
        services: raw.services,
        roles: raw.roles,
        queues: raw.queues,
        backend: raw.backend,
        frontend: raw.frontend,
        jobs: raw.jobs,
    })
}

fn non_empty(field: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        return Err(ProvisionError::ConfigError(format!("[{field}] must not be empty")));
    }
    Ok(value)
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| ProvisionError::ConfigError(format!("[{field}]: {e}")))
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
