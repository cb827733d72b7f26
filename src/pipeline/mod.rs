// src/pipeline/mod.rs

//! The provisioning pipeline.
//!
//! A fixed, ordered list of [`Step`]s. Steps that create a named resource
//! list what exists first and only create what is missing; everything else
//! is idempotent at the provider. Each step declares an [`OnError`] policy:
//!
//! - `Fatal`: any error aborts the remaining steps.
//! - `RecoverAsEmpty`: the step's listing command may fail; its output is
//!   then taken to be empty (queues).
//! - `BestEffort`: failure of the step is logged and the run goes on
//!   (credential revocation).
//!
//! Progress lines are published in step order. The terminal `done` event is
//! not the pipeline's business; see [`crate::engine`].

pub mod extract;
pub mod names;
mod steps;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::PipelineSettings;
use crate::errors::Result;
use crate::exec::RetryExecutor;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::types::OnError;

pub use names::ResourceNames;

/// Pipeline steps in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    ResolveProject,
    ActivateProject,
    LinkBilling,
    EnableServices,
    EnsureApp,
    AwaitServiceIdentity,
    GrantRoles,
    CreateCredentials,
    EnsureQueues,
    DeployBackend,
    PublishFrontend,
    RecordProvenance,
    ScheduleJobs,
    RevokeCredentials,
    AnnounceCompletion,
}

impl Step {
    pub const ALL: [Step; 15] = [
        Step::ResolveProject,
        Step::ActivateProject,
        Step::LinkBilling,
        Step::EnableServices,
        Step::EnsureApp,
        Step::AwaitServiceIdentity,
        Step::GrantRoles,
        Step::CreateCredentials,
        Step::EnsureQueues,
        Step::DeployBackend,
        Step::PublishFrontend,
        Step::RecordProvenance,
        Step::ScheduleJobs,
        Step::RevokeCredentials,
        Step::AnnounceCompletion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Step::ResolveProject => "resolve-project",
            Step::ActivateProject => "activate-project",
            Step::LinkBilling => "link-billing",
            Step::EnableServices => "enable-services",
            Step::EnsureApp => "ensure-app",
            Step::AwaitServiceIdentity => "await-service-identity",
            Step::GrantRoles => "grant-roles",
            Step::CreateCredentials => "create-credentials",
            Step::EnsureQueues => "ensure-queues",
            Step::DeployBackend => "deploy-backend",
            Step::PublishFrontend => "publish-frontend",
            Step::RecordProvenance => "record-provenance",
            Step::ScheduleJobs => "schedule-jobs",
            Step::RevokeCredentials => "revoke-credentials",
            Step::AnnounceCompletion => "announce-completion",
        }
    }

    pub fn policy(self) -> OnError {
        match self {
            Step::EnsureQueues => OnError::RecoverAsEmpty,
            Step::RevokeCredentials => OnError::BestEffort,
            _ => OnError::Fatal,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a check-before-create step found its resource already present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDecision {
    pub kind: &'static str,
    pub name: String,
    pub existed: bool,
}

/// Per-run state. Nothing in here outlives the run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub names: ResourceNames,
    /// Whether the caller chose the project name.
    pub requested: bool,
    /// Id of the downloaded service account key, revoked at the end.
    pub key_id: Option<String>,
    pub decisions: Vec<ResourceDecision>,
    pub completed: Vec<Step>,
}

impl RunContext {
    pub fn new(project: &str, requested: bool) -> Self {
        Self {
            names: ResourceNames::for_project(project),
            requested,
            key_id: None,
            decisions: Vec::new(),
            completed: Vec::new(),
        }
    }

    pub fn project(&self) -> &str {
        &self.names.project
    }

    fn decide(&mut self, kind: &'static str, name: &str, existed: bool) {
        debug!(kind, name, existed, "existence decision");
        self.decisions.push(ResourceDecision {
            kind,
            name: name.to_string(),
            existed,
        });
    }
}

/// One provisioning attempt, reporting to one sink.
pub struct Pipeline {
    settings: Arc<PipelineSettings>,
    executor: RetryExecutor,
    sink: Arc<dyn ProgressSink>,
}

impl Pipeline {
    pub fn new(
        settings: Arc<PipelineSettings>,
        executor: RetryExecutor,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            settings,
            executor,
            sink,
        }
    }

    /// Run every step in order.
    ///
    /// `project`: caller-chosen project name, or `None` to generate one.
    /// Returns the run context on success; the first fatal error otherwise.
    /// A name that is not a valid project id fails with
    /// [`ProvisionError::InvalidProjectId`](crate::errors::ProvisionError)
    /// and runs nothing.
    pub async fn run(&self, project: Option<String>) -> Result<RunContext> {
        let mut ctx = match project {
            Some(name) => RunContext::new(&name, true),
            None => RunContext::new(
                &names::generated_project_name(&self.settings.project_prefix, chrono::Utc::now()),
                false,
            ),
        };
        // Names reach `sh -c`; refuse anything outside the id grammar before
        // a single command runs.
        names::validate_project_id(ctx.project())?;
        info!(project = %ctx.project(), requested = ctx.requested, "provisioning started");

        for step in Step::ALL {
            debug!(step = %step, policy = %step.policy(), "starting step");
            match self.execute_step(step, &mut ctx).await {
                Ok(()) => ctx.completed.push(step),
                Err(e) if step.policy() == OnError::BestEffort => {
                    warn!(step = %step, error = %e, "best-effort step failed; continuing");
                }
                Err(e) => {
                    warn!(step = %step, error = %e, "step failed; aborting run");
                    return Err(e);
                }
            }
        }

        info!(project = %ctx.project(), "provisioning finished");
        Ok(ctx)
    }

    async fn execute_step(&self, step: Step, ctx: &mut RunContext) -> Result<()> {
        match step {
            Step::ResolveProject => self.resolve_project(ctx).await,
            Step::ActivateProject => self.activate_project(ctx).await,
            Step::LinkBilling => self.link_billing(ctx).await,
            Step::EnableServices => self.enable_services().await,
            Step::EnsureApp => self.ensure_app(ctx).await,
            Step::AwaitServiceIdentity => self.await_service_identity(ctx).await,
            Step::GrantRoles => self.grant_roles(ctx).await,
            Step::CreateCredentials => self.create_credentials(ctx).await,
            Step::EnsureQueues => self.ensure_queues(ctx).await,
            Step::DeployBackend => self.deploy_backend().await,
            Step::PublishFrontend => self.publish_frontend(ctx).await,
            Step::RecordProvenance => self.record_provenance(ctx).await,
            Step::ScheduleJobs => self.schedule_jobs(ctx).await,
            Step::RevokeCredentials => self.revoke_credentials(ctx).await,
            Step::AnnounceCompletion => self.announce_completion(ctx),
        }
    }

    fn say(&self, text: impl Into<String>) {
        self.sink.publish(ProgressEvent::message(text));
    }

    async fn exec(&self, command: &str) -> Result<String> {
        self.executor.run(command).await
    }

    /// Run a listing command under `step`'s policy.
    async fn list(&self, step: Step, command: &str) -> Result<String> {
        match self.executor.run(command).await {
            Ok(output) => Ok(output),
            Err(e) if step.policy() == OnError::RecoverAsEmpty => {
                warn!(step = %step, error = %e, "listing failed; treating it as empty");
                Ok(String::new())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_ordered_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for step in Step::ALL {
            assert!(seen.insert(step), "duplicate step {step}");
        }
        assert_eq!(Step::ALL.first(), Some(&Step::ResolveProject));
        assert_eq!(Step::ALL.last(), Some(&Step::AnnounceCompletion));
    }

    #[test]
    fn only_queues_and_revocation_relax_the_fatal_policy() {
        let relaxed: Vec<_> = Step::ALL
            .into_iter()
            .filter(|s| s.policy() != OnError::Fatal)
            .collect();
        assert_eq!(relaxed, vec![Step::EnsureQueues, Step::RevokeCredentials]);
        assert_eq!(Step::EnsureQueues.policy(), OnError::RecoverAsEmpty);
        assert_eq!(Step::RevokeCredentials.policy(), OnError::BestEffort);
    }
}
