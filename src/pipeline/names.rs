// src/pipeline/names.rs

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::errors::{ProvisionError, Result};

static PROJECT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]{4,28}[a-z0-9]$").expect("static regex"));

/// Every cloud resource name derived from the project name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub project: String,
    /// Platform-managed identity created together with the app.
    pub service_identity: String,
    pub bucket: String,
    pub bucket_url: String,
    /// Public entry point of the published frontend.
    pub public_url: String,
}

impl ResourceNames {
    pub fn for_project(project: &str) -> Self {
        let bucket = format!("frontend-{project}");
        Self {
            project: project.to_string(),
            service_identity: format!("{project}@appspot.gserviceaccount.com"),
            bucket_url: format!("gs://{bucket}"),
            public_url: format!("http://storage.googleapis.com/{bucket}/signup-v2.html"),
            bucket,
        }
    }
}

/// Accept only names matching the project-id grammar: 6 to 30 characters of
/// lowercase letters, digits and hyphens, starting with a letter and not
/// ending with a hyphen. Names end up on command lines.
pub fn validate_project_id(name: &str) -> Result<()> {
    if PROJECT_ID.is_match(name) {
        Ok(())
    } else {
        Err(ProvisionError::InvalidProjectId(name.to_string()))
    }
}

/// `<prefix>-<unix seconds>`; unique per second, so no existence check.
pub fn generated_project_name(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{prefix}-{}", now.timestamp())
}

/// Directory `git clone <repository>` creates.
pub fn checkout_dir(repository: &str) -> String {
    let last = repository
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(repository);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}
