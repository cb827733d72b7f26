// src/engine/mod.rs

//! Orchestration engine for cloudstrap.
//!
//! Ties one observer's token submission to one provisioning run:
//! - consume the parked login session through the broker,
//! - run the pipeline against a fresh retry executor,
//! - turn any fatal error into one generic observer-facing message,
//! - end with exactly one `done` event, whatever happened.
//!
//! Error details go to the log only.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::{ConfigFile, PipelineSettings};
use crate::errors::Result;
use crate::exec::{CommandRunner, RetryExecutor};
use crate::pipeline::{Pipeline, RunContext};
use crate::progress::{ProgressEvent, ProgressSink, TerminalGuard};
use crate::session::{LoginTicket, SessionBroker};
use crate::types::SessionId;

/// Message shown to the observer for every fatal error.
pub const FAILURE_MESSAGE: &str = "install failed - see logs for details";

/// A token submission coming from an observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub session_id: SessionId,
    pub token: String,
    /// Caller-chosen project name; `None` generates one.
    pub project: Option<String>,
}

impl InstallRequest {
    pub fn new(session_id: SessionId, token: impl Into<String>, project: Option<String>) -> Self {
        // An empty project field means "pick one for me".
        let project = project
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        Self {
            session_id,
            token: token.into(),
            project,
        }
    }
}

pub struct Engine {
    config: Arc<ConfigFile>,
    pipeline_settings: Arc<PipelineSettings>,
    broker: SessionBroker,
    runner: Arc<dyn CommandRunner>,
}

impl Engine {
    pub fn new(config: Arc<ConfigFile>, broker: SessionBroker, runner: Arc<dyn CommandRunner>) -> Self {
        let pipeline_settings = Arc::new(config.pipeline.clone());
        Self {
            config,
            pipeline_settings,
            broker,
            runner,
        }
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn broker(&self) -> &SessionBroker {
        &self.broker
    }

    /// Start a login for a new observer.
    pub async fn begin_login(&self) -> Result<LoginTicket> {
        self.broker.begin_login().await
    }

    /// Complete the login named by `request` and provision the project,
    /// reporting to `sink`.
    ///
    /// Never fails: errors are logged, reported generically, and the last
    /// event on `sink` is always a single `Done`. Returns the run context
    /// when the pipeline completed.
    pub async fn handle_submission(
        &self,
        request: InstallRequest,
        sink: Arc<dyn ProgressSink>,
    ) -> Option<RunContext> {
        let _done = TerminalGuard::new(sink.clone());

        match self.provision(request, sink.clone()).await {
            Ok(ctx) => {
                let created = ctx.decisions.iter().filter(|d| !d.existed).count();
                info!(
                    project = %ctx.project(),
                    created,
                    reused = ctx.decisions.len() - created,
                    "install succeeded"
                );
                Some(ctx)
            }
            Err(e) => {
                error!(error = %e, "install failed");
                sink.publish(ProgressEvent::message(FAILURE_MESSAGE));
                None
            }
        }
    }

    async fn provision(&self, request: InstallRequest, sink: Arc<dyn ProgressSink>) -> Result<RunContext> {
        let login = self
            .broker
            .submit(&request.session_id, &request.token)
            .await?;
        if !login.success() {
            warn!(
                session = %request.session_id,
                status = ?login.status,
                "continuing after unsuccessful login; later commands will surface the problem"
            );
        }

        let executor = RetryExecutor::new(self.runner.clone(), self.config.retry);
        let pipeline = Pipeline::new(self.pipeline_settings.clone(), executor, sink);
        pipeline.run(request.project).await
    }
}
