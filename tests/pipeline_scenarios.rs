// tests/pipeline_scenarios.rs

use std::error::Error;
use std::sync::Arc;

use cloudstrap::config::ConfigFile;
use cloudstrap::errors::ProvisionError;
use cloudstrap::exec::RetryExecutor;
use cloudstrap::pipeline::{Pipeline, Step};
use cloudstrap::progress::ProgressEvent;
use cloudstrap_test_utils::builders::ConfigFileBuilder;
use cloudstrap_test_utils::fake_runner::{success, ScriptedRunner};
use cloudstrap_test_utils::recording_sink::RecordingSink;
use cloudstrap_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const QUEUES: [&str; 5] = [
    "post-created",
    "post-notify",
    "ack-connection",
    "request-connection",
    "comment-created",
];

fn config(dir: &tempfile::TempDir) -> ConfigFile {
    ConfigFileBuilder::new().with_work_dir(dir.path()).build()
}

fn pipeline(config: &ConfigFile, runner: &ScriptedRunner, sink: &RecordingSink) -> Pipeline {
    Pipeline::new(
        Arc::new(config.pipeline.clone()),
        RetryExecutor::new(Arc::new(runner.clone()), config.retry),
        Arc::new(sink.clone()),
    )
}

#[tokio::test]
async fn fresh_project_is_built_and_launched() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = config(&dir);
    let runner = ScriptedRunner::happy_path("demo-1");
    let sink = RecordingSink::new();

    let ctx = with_timeout(pipeline(&config, &runner, &sink).run(Some("demo-1".into()))).await?;

    assert_eq!(ctx.completed, Step::ALL.to_vec());
    assert_eq!(ctx.key_id.as_deref(), Some("a1b2c3d4e5"));
    assert_eq!(runner.calls_starting_with("gcloud projects create demo-1").len(), 1);
    assert_eq!(runner.calls_starting_with("gcloud config set project demo-1").len(), 1);
    assert_eq!(
        runner.calls_starting_with("gcloud beta billing projects link demo-1 --billing-account=billingAccounts/0X0X0X-0X0X0X-0X0X0X").len(),
        1
    );
    assert_eq!(runner.calls_starting_with("gcloud tasks queues create").len(), 5);
    assert_eq!(runner.calls_starting_with("gcloud run jobs create").len(), 2);
    assert_eq!(
        runner.calls_starting_with("gcloud iam service-accounts keys delete a1b2c3d4e5").len(),
        1
    );

    let events = sink.events();
    match events.last() {
        Some(ProgressEvent::Launch { url }) => {
            assert!(url.ends_with("frontend-demo-1/signup-v2.html"), "url {url}");
        }
        other => panic!("expected launch last, got {other:?}"),
    }
    let messages = sink.messages();
    assert_eq!(messages.first().map(String::as_str), Some("Creating project demo-1..."));
    assert!(messages.contains(&"Access your new app at http://storage.googleapis.com/frontend-demo-1/signup-v2.html".to_string()));

    // Transient revision files do not outlive the run.
    assert!(!dir.path().join("backend-revision.json").exists());
    assert!(!dir.path().join("frontend-revision.json").exists());
    Ok(())
}

#[tokio::test]
async fn steps_issue_commands_in_pipeline_order() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = config(&dir);
    let runner = ScriptedRunner::happy_path("demo-1");
    let sink = RecordingSink::new();

    pipeline(&config, &runner, &sink).run(Some("demo-1".into())).await?;

    let calls = runner.calls();
    let position = |prefix: &str| {
        calls
            .iter()
            .position(|c| c.starts_with(prefix))
            .unwrap_or_else(|| panic!("no call starting with {prefix}"))
    };
    let order = [
        "gcloud projects create",
        "gcloud config set project",
        "gcloud beta billing projects link",
        "gcloud services enable cloudbuild.googleapis.com",
        "gcloud app create",
        "gcloud iam service-accounts list",
        "gcloud projects add-iam-policy-binding",
        "gcloud iam service-accounts keys create",
        "gcloud tasks queues list",
        "gcloud datastore indexes create",
        "gsutil mb",
        "gcloud secrets versions add",
        "gcloud run jobs list",
        "gcloud iam service-accounts keys delete",
    ];
    let positions: Vec<usize> = order.iter().map(|p| position(p)).collect();
    let mut sorted = positions.clone();
    sorted.sort();
    assert_eq!(positions, sorted, "commands out of order: {calls:#?}");
    Ok(())
}

#[tokio::test]
async fn existing_resources_are_not_created_again() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = config(&dir);
    let runner = ScriptedRunner::happy_path("demo-1");
    runner
        .succeed_with("gcloud projects list", "other-project\ndemo-1\n")
        .succeed_with("gcloud app versions list", "SERVICE  VERSION\ndefault  20240101t000000\n")
        .succeed_with("gcloud tasks queues list", &QUEUES.join("\n"))
        .succeed_with("gsutil ls", "gs://frontend-demo-1/\n")
        .succeed_with("gcloud secrets list", "backend-revision\nfrontend-revision\n")
        .succeed_with("gcloud run jobs list", "backend-update\nfrontend-update\n");
    let sink = RecordingSink::new();

    let ctx = pipeline(&config, &runner, &sink).run(Some("demo-1".into())).await?;

    for prefix in [
        "gcloud projects create",
        "gcloud app create",
        "gcloud tasks queues create",
        "gsutil mb",
        "gcloud secrets create",
        "gcloud run jobs create",
    ] {
        assert!(
            runner.calls_starting_with(prefix).is_empty(),
            "unexpected `{prefix}`"
        );
    }
    assert_eq!(runner.calls_starting_with("gcloud run jobs update").len(), 2);
    assert_eq!(runner.calls_starting_with("gcloud secrets versions add").len(), 2);
    assert!(ctx.decisions.iter().all(|d| d.existed));
    Ok(())
}

#[tokio::test]
async fn generated_project_is_always_created() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = config(&dir);
    // No billing account: the run stops right after the project steps.
    let runner = ScriptedRunner::new();
    let sink = RecordingSink::new();

    let err = pipeline(&config, &runner, &sink)
        .run(None)
        .await
        .expect_err("no billing account scripted");

    assert!(matches!(err, ProvisionError::ParseError { .. }));
    assert!(runner.calls_starting_with("gcloud projects list").is_empty());
    let creates = runner.calls_starting_with("gcloud projects create vincent-");
    assert_eq!(creates.len(), 1, "calls: {:#?}", runner.calls());
    Ok(())
}

#[tokio::test]
async fn failed_queue_listing_is_treated_as_empty() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = config(&dir);
    let runner = ScriptedRunner::happy_path("demo-1");
    runner.always_fail("gcloud tasks queues list");
    let sink = RecordingSink::new();

    let ctx = pipeline(&config, &runner, &sink).run(Some("demo-1".into())).await?;

    assert_eq!(
        runner.calls_starting_with("gcloud tasks queues list").len(),
        config.retry.max_attempts as usize
    );
    let created = runner.calls_starting_with("gcloud tasks queues create");
    assert_eq!(created.len(), QUEUES.len());
    for queue in QUEUES {
        assert!(created.iter().any(|c| c.ends_with(queue)), "{queue} not created");
    }
    assert!(ctx.completed.contains(&Step::EnsureQueues));
    Ok(())
}

#[tokio::test]
async fn other_listing_failures_abort_the_run() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = config(&dir);
    let runner = ScriptedRunner::happy_path("demo-1");
    runner.always_fail("gcloud secrets list");
    let sink = RecordingSink::new();

    let err = pipeline(&config, &runner, &sink)
        .run(Some("demo-1".into()))
        .await
        .expect_err("secrets listing is fatal");

    assert!(matches!(err, ProvisionError::RetryExhausted { .. }));
    assert!(runner.calls_starting_with("gcloud run jobs").is_empty());
    Ok(())
}

#[tokio::test]
async fn identity_that_never_appears_fails_the_run() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = config(&dir);
    let runner = ScriptedRunner::happy_path("demo-1");
    runner.succeed_with("gcloud iam service-accounts list", "someone-else@example.com\n");
    let sink = RecordingSink::new();

    let err = pipeline(&config, &runner, &sink)
        .run(Some("demo-1".into()))
        .await
        .expect_err("identity never created");

    match err {
        ProvisionError::IdentityNeverCreated(identity) => {
            assert_eq!(identity, "demo-1@appspot.gserviceaccount.com");
        }
        other => panic!("expected IdentityNeverCreated, got {other:?}"),
    }
    assert_eq!(
        runner.calls_starting_with("gcloud iam service-accounts list").len(),
        config.retry.max_attempts as usize
    );
    assert!(runner.calls_starting_with("gcloud projects add-iam-policy-binding").is_empty());
    assert_eq!(
        sink.messages().last().map(String::as_str),
        Some("Service account was never created. Failing...")
    );
    Ok(())
}

#[tokio::test]
async fn identity_appearing_late_is_accepted() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = config(&dir);
    let runner = ScriptedRunner::happy_path("demo-1");
    runner
        .once("gcloud iam service-accounts list", success(""))
        .once("gcloud iam service-accounts list", success(""));
    let sink = RecordingSink::new();

    pipeline(&config, &runner, &sink).run(Some("demo-1".into())).await?;

    assert_eq!(runner.calls_starting_with("gcloud iam service-accounts list").len(), 3);
    Ok(())
}

#[tokio::test]
async fn unparseable_billing_output_is_a_parse_error() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = config(&dir);
    let runner = ScriptedRunner::happy_path("demo-1");
    runner.succeed_with("gcloud beta billing accounts list", "Listed 0 items.\n");
    let sink = RecordingSink::new();

    let err = pipeline(&config, &runner, &sink)
        .run(Some("demo-1".into()))
        .await
        .expect_err("no billing account");

    assert!(matches!(err, ProvisionError::ParseError { what: "billing account" }));
    assert!(runner.calls_starting_with("gcloud beta billing projects link").is_empty());
    Ok(())
}

#[tokio::test]
async fn revocation_failure_does_not_fail_the_run() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = config(&dir);
    let runner = ScriptedRunner::happy_path("demo-1");
    runner.always_fail("gcloud iam service-accounts keys delete");
    let sink = RecordingSink::new();
    // Stands in for the key `keys create` downloads.
    let key_file = dir.path().join(&config.pipeline.credentials_file);
    std::fs::write(&key_file, r#"{"private_key": "secret"}"#)?;

    let ctx = pipeline(&config, &runner, &sink).run(Some("demo-1".into())).await?;

    assert!(!key_file.exists(), "private key left on disk");
    assert!(!ctx.completed.contains(&Step::RevokeCredentials));
    assert!(ctx.completed.contains(&Step::AnnounceCompletion));
    assert!(matches!(sink.events().last(), Some(ProgressEvent::Launch { .. })));
    Ok(())
}

#[tokio::test]
async fn project_name_with_shell_syntax_runs_nothing() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = config(&dir);
    let marker = dir.path().join("pwned");
    let sink = RecordingSink::new();

    for name in [
        format!("x;touch {};#", marker.display()),
        "demo-1 && rm -rf /".to_string(),
        "$(touch pwned)".to_string(),
        "demo`id`".to_string(),
        "Demo-1".to_string(),
    ] {
        let runner = ScriptedRunner::happy_path("demo-1");
        let err = pipeline(&config, &runner, &sink)
            .run(Some(name.clone()))
            .await
            .expect_err("name must be rejected");

        assert!(matches!(err, ProvisionError::InvalidProjectId(_)), "{name}: {err:?}");
        assert!(runner.calls().is_empty(), "{name} issued {:#?}", runner.calls());
    }
    assert!(!marker.exists());
    assert!(sink.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn free_text_arguments_are_shell_quoted() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = config(&dir);
    let runner = ScriptedRunner::happy_path("demo-1");
    let sink = RecordingSink::new();

    pipeline(&config, &runner, &sink).run(Some("demo-1".into())).await?;

    let create = runner.calls_starting_with("gcloud projects create");
    assert_eq!(create, vec!["gcloud projects create demo-1 --name='Social Media' --quiet".to_string()]);
    assert_eq!(
        runner.calls_starting_with("gcloud projects list"),
        vec!["gcloud projects list --format='value(projectId)'".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn app_listing_that_cannot_start_means_no_app() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = config(&dir);
    let runner = ScriptedRunner::happy_path("demo-1");
    runner.fail_to_spawn("gcloud app versions list");
    let sink = RecordingSink::new();

    let ctx = pipeline(&config, &runner, &sink).run(Some("demo-1".into())).await?;

    assert_eq!(runner.calls_starting_with("gcloud app versions list").len(), 1);
    assert_eq!(runner.calls_starting_with("gcloud app create").len(), 1);
    assert!(ctx.completed.contains(&Step::EnsureApp));
    Ok(())
}
