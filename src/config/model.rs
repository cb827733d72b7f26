// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// Every section is optional; an empty file (or no file at all) yields the
/// built-in pipeline:
///
/// ```toml
/// [server]
/// port = 8080
/// keep_alive_interval = "2s"
///
/// [retry]
/// max_attempts = 5
/// backoff = "3s"
///
/// [pipeline]
/// region = "us-west2"
/// queues = ["post-created", "post-notify"]
///
/// [[pipeline.jobs]]
/// name = "backend-update"
/// memory = "1Gi"
/// cpu = "1"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: RawServerSection,

    #[serde(default)]
    pub retry: RawRetrySection,

    #[serde(default)]
    pub login: RawLoginSection,

    #[serde(default)]
    pub pipeline: RawPipelineSection,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RawServerSection {
    /// Port used when neither `--port` nor `PORT` is given.
    pub port: u16,

    /// Interval between heartbeat events, e.g. `"2s"`.
    pub keep_alive_interval: String,
}

impl Default for RawServerSection {
    fn default() -> Self {
        Self {
            port: 8080,
            keep_alive_interval: "2s".to_string(),
        }
    }
}

/// `[retry]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RawRetrySection {
    pub max_attempts: u32,

    /// Fixed sleep between attempts. No jitter, no growth.
    pub backoff: String,

    /// Upper bound for a single command execution.
    pub command_timeout: String,
}

impl Default for RawRetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: "3s".to_string(),
            command_timeout: "30m".to_string(),
        }
    }
}

/// `[login]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RawLoginSection {
    /// Interactive command that prints a login URL and then reads a token.
    pub command: String,

    /// Regex the login URL must match in the command's output.
    pub url_pattern: String,

    pub prompt_timeout: String,
    pub exit_timeout: String,

    /// How long a started login may wait for its token before it is
    /// discarded and its process killed.
    pub session_ttl: String,
}

impl Default for RawLoginSection {
    fn default() -> Self {
        Self {
            command: "gcloud auth login --no-launch-browser --quiet".to_string(),
            url_pattern: r"https://accounts.google.com/o/oauth2/auth\?.*".to_string(),
            prompt_timeout: "60s".to_string(),
            exit_timeout: "2m".to_string(),
            session_ttl: "10m".to_string(),
        }
    }
}

/// `[pipeline]` section: the fixed names, regions and lists the
/// provisioning steps operate on.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RawPipelineSection {
    /// Prefix for generated project names (`<prefix>-<unix timestamp>`).
    pub project_prefix: String,
    pub project_display_name: String,
    pub region: String,
    pub bucket_location: String,

    /// Directory every command runs in; repositories are cloned here.
    pub work_dir: PathBuf,

    /// File the service account key is downloaded to.
    pub credentials_file: String,

    pub services: Vec<String>,
    pub roles: Vec<String>,
    pub queues: Vec<String>,
    pub backend: BackendSection,
    pub frontend: FrontendSection,
    pub jobs: Vec<JobSection>,
}

impl Default for RawPipelineSection {
    fn default() -> Self {
        Self {
            project_prefix: "vincent".to_string(),
            project_display_name: "Social Media".to_string(),
            region: "us-west2".to_string(),
            bucket_location: "us".to_string(),
            work_dir: PathBuf::from("."),
            credentials_file: "service-account-creds.json".to_string(),
            services: to_strings(&[
                "cloudbuild.googleapis.com",
                "cloudtasks.googleapis.com",
                "secretmanager.googleapis.com",
                "run.googleapis.com",
            ]),
            roles: to_strings(&["roles/secretmanager.secretAccessor", "roles/run.invoker"]),
            queues: to_strings(&[
                "post-created",
                "post-notify",
                "ack-connection",
                "request-connection",
                "comment-created",
            ]),
            backend: BackendSection::default(),
            frontend: FrontendSection::default(),
            jobs: vec![
                JobSection {
                    name: "backend-update".to_string(),
                    image: DEFAULT_JOB_IMAGE.to_string(),
                    memory: "1Gi".to_string(),
                    cpu: "1".to_string(),
                },
                JobSection {
                    name: "frontend-update".to_string(),
                    image: DEFAULT_JOB_IMAGE.to_string(),
                    memory: "2Gi".to_string(),
                    cpu: "2".to_string(),
                },
            ],
        }
    }
}

const DEFAULT_JOB_IMAGE: &str = "gcr.io/google.com/cloudsdktool/google-cloud-cli:slim";

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// `[pipeline.backend]` section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendSection {
    pub repository: String,
    pub deploy_command: String,
    /// Secret that receives the deployed revision id.
    pub secret: String,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            repository: "https://github.com/valkolovos/socialmedia.git".to_string(),
            deploy_command: "./deploy_app.sh".to_string(),
            secret: "backend-revision".to_string(),
        }
    }
}

/// `[pipeline.frontend]` section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FrontendSection {
    pub repository: String,
    pub install_command: String,
    /// Invoked as `<build_command> <project>`.
    pub build_command: String,
    pub secret: String,
}

impl Default for FrontendSection {
    fn default() -> Self {
        Self {
            repository: "https://github.com/valkolovos/socialmedia-frontend.git".to_string(),
            install_command: "./frontend_install_dependencies.sh".to_string(),
            build_command: "./frontend_build.sh".to_string(),
            secret: "frontend-revision".to_string(),
        }
    }
}

/// `[[pipeline.jobs]]` entry: one update job and its sizing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct JobSection {
    pub name: String,
    #[serde(default = "default_job_image")]
    pub image: String,
    pub memory: String,
    pub cpu: String,
}

fn default_job_image() -> String {
    DEFAULT_JOB_IMAGE.to_string()
}

/// Validated configuration used by the rest of the crate.
///
/// Built from a [`RawConfigFile`] through `TryFrom` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub server: ServerSettings,
    pub retry: RetrySettings,
    pub login: LoginSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub port: u16,
    pub keep_alive_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub command_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoginSettings {
    pub command: String,
    pub url_pattern: Regex,
    pub prompt_timeout: Duration,
    pub exit_timeout: Duration,
    pub session_ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub project_prefix: String,
    pub project_display_name: String,
    pub region: String,
    pub bucket_location: String,
    pub work_dir: PathBuf,
    pub credentials_file: String,
    pub services: Vec<String>,
    pub roles: Vec<String>,
    pub queues: Vec<String>,
    pub backend: BackendSection,
    pub frontend: FrontendSection,
    pub jobs: Vec<JobSection>,
}
