// tests/config_loading.rs

use std::error::Error;
use std::io::Write;
use std::time::Duration;

use cloudstrap::config::{load_and_validate, load_or_default};
use cloudstrap::errors::ProvisionError;

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(contents: &str) -> Result<tempfile::NamedTempFile, Box<dyn Error>> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

#[test]
fn partial_file_keeps_defaults_for_the_rest() -> TestResult {
    let file = write_config(
        r#"
[server]
port = 9000

[retry]
backoff = "500ms"

[pipeline]
region = "europe-west1"
queues = ["only-queue"]

[[pipeline.jobs]]
name = "nightly"
memory = "512Mi"
cpu = "1"
"#,
    )?;

    let config = load_and_validate(file.path())?;

    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.keep_alive_interval, Duration::from_secs(2));
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.backoff, Duration::from_millis(500));
    assert_eq!(config.pipeline.region, "europe-west1");
    assert_eq!(config.pipeline.queues, vec!["only-queue".to_string()]);
    assert_eq!(config.pipeline.jobs.len(), 1);
    assert_eq!(
        config.pipeline.jobs[0].image,
        "gcr.io/google.com/cloudsdktool/google-cloud-cli:slim"
    );
    assert_eq!(config.pipeline.project_prefix, "vincent");
    Ok(())
}

#[test]
fn missing_file_yields_defaults() -> TestResult {
    let dir = tempfile::tempdir()?;
    let config = load_or_default(dir.path().join("Cloudstrap.toml"))?;

    assert_eq!(config.server.port, 8080);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.backoff, Duration::from_secs(3));
    assert_eq!(config.pipeline.queues.len(), 5);
    Ok(())
}

#[test]
fn invalid_values_are_config_errors() -> TestResult {
    let file = write_config("[retry]\nmax_attempts = 0\n")?;
    let err = load_and_validate(file.path()).expect_err("zero attempts");
    assert!(matches!(err, ProvisionError::ConfigError(_)));

    let file = write_config("[login]\nprompt_timeout = \"soon\"\n")?;
    let err = load_and_validate(file.path()).expect_err("bad duration");
    assert!(matches!(err, ProvisionError::ConfigError(_)));
    Ok(())
}

#[test]
fn malformed_toml_is_reported() -> TestResult {
    let file = write_config("[server\nport = 1")?;
    let err = load_and_validate(file.path()).expect_err("malformed");
    assert!(matches!(err, ProvisionError::TomlError(_)));
    Ok(())
}
