// src/pipeline/steps.rs

//! Individual step implementations.

use serde::Serialize;
use shell_words::quote;
use tracing::{debug, info, warn};

use crate::errors::{ProvisionError, Result};
use crate::pipeline::extract::{self, contains_resource};
use crate::pipeline::names::checkout_dir;
use crate::pipeline::{Pipeline, RunContext, Step};
use crate::progress::ProgressEvent;

/// Body of the transient file handed to `gcloud secrets versions add`.
#[derive(Debug, Serialize)]
struct RevisionRecord<'a> {
    revision: &'a str,
}

impl Pipeline {
    pub(super) async fn resolve_project(&self, ctx: &mut RunContext) -> Result<()> {
        let project = ctx.project().to_string();

        if ctx.requested {
            let listing = self
                .list(Step::ResolveProject, "gcloud projects list --format='value(projectId)'")
                .await?;
            let existed = contains_resource(&listing, &project);
            ctx.decide("project", &project, existed);
            if existed {
                info!(project = %project, "using existing project");
                return Ok(());
            }
        }

        self.say(format!("Creating project {project}..."));
        self.exec(&format!(
            "gcloud projects create {} --name={} --quiet",
            quote(&project),
            quote(&self.settings.project_display_name)
        ))
        .await?;
        self.say("Done creating project");
        Ok(())
    }

    pub(super) async fn activate_project(&self, ctx: &RunContext) -> Result<()> {
        self.exec(&format!("gcloud config set project {}", quote(ctx.project())))
            .await?;
        Ok(())
    }

    pub(super) async fn link_billing(&self, ctx: &RunContext) -> Result<()> {
        self.say("Enabling billing service...");
        self.exec("gcloud services enable cloudbilling.googleapis.com")
            .await?;
        self.say("Done billing service");

        self.say("Linking billing account to project...");
        let accounts = self
            .exec("gcloud beta billing accounts list --format=config")
            .await?;
        let account = extract::billing_account(&accounts)?;
        self.exec(&format!(
            "gcloud beta billing projects link {} --billing-account={}",
            quote(ctx.project()),
            quote(&account)
        ))
        .await?;
        self.say("Done linking billing account");
        Ok(())
    }

    pub(super) async fn enable_services(&self) -> Result<()> {
        if self.settings.services.is_empty() {
            return Ok(());
        }
        let services = self.settings.services.join(", ");
        self.say(format!("Enabling services {services}..."));
        for service in self.settings.services.iter() {
            self.exec(&format!("gcloud services enable {}", quote(service)))
                .await?;
        }
        self.say(format!("Done enabling services {services}"));
        Ok(())
    }

    /// Existence is signalled by the listing's exit status, not its output.
    /// A listing that cannot even be started counts as "no app".
    pub(super) async fn ensure_app(&self, ctx: &mut RunContext) -> Result<()> {
        let check = "gcloud app versions list";
        info!(command = %check, "checking for existing app");
        let existed = match self
            .executor
            .runner()
            .run(check, self.executor.settings().command_timeout)
            .await
        {
            Ok(outcome) => outcome.success(),
            Err(e) => {
                warn!(command = %check, error = %e, "app check could not be run");
                false
            }
        };
        let project = ctx.project().to_string();
        ctx.decide("app", &project, existed);
        if existed {
            return Ok(());
        }

        self.say("Creating app...");
        self.exec(&format!(
            "gcloud app create --region={} --quiet",
            quote(&self.settings.region)
        ))
        .await?;
        self.say("Done creating app");
        Ok(())
    }

    /// Poll until the identity shows up. Shares the retry shape but not the
    /// error: running out of polls is `IdentityNeverCreated`.
    pub(super) async fn await_service_identity(&self, ctx: &RunContext) -> Result<()> {
        let identity = &ctx.names.service_identity;
        let retry = self.executor.settings();

        for poll in 1..=retry.max_attempts {
            let accounts = self.exec("gcloud iam service-accounts list").await?;
            if contains_resource(&accounts, identity) {
                debug!(identity = %identity, poll, "service identity present");
                return Ok(());
            }
            debug!(identity = %identity, poll, "service identity not there yet");
            if poll < retry.max_attempts {
                tokio::time::sleep(retry.backoff).await;
            }
        }

        self.say("Service account was never created. Failing...");
        Err(ProvisionError::IdentityNeverCreated(identity.clone()))
    }

    pub(super) async fn grant_roles(&self, ctx: &RunContext) -> Result<()> {
        if self.settings.roles.is_empty() {
            return Ok(());
        }
        self.say("Granting roles to service account...");
        for role in self.settings.roles.iter() {
            self.exec(&format!(
                "gcloud projects add-iam-policy-binding {} --member={} --role={} --quiet",
                quote(ctx.project()),
                quote(&format!("serviceAccount:{}", ctx.names.service_identity)),
                quote(role)
            ))
            .await?;
        }
        self.say("Done granting roles");
        Ok(())
    }

    pub(super) async fn create_credentials(&self, ctx: &mut RunContext) -> Result<()> {
        self.say("Creating and downloading service account credentials...");
        let output = self
            .exec(&format!(
                "gcloud iam service-accounts keys create {} --iam-account={}",
                quote(&self.settings.credentials_file),
                quote(&ctx.names.service_identity)
            ))
            .await?;
        ctx.key_id = Some(extract::created_key_id(&output)?);
        Ok(())
    }

    pub(super) async fn ensure_queues(&self, ctx: &mut RunContext) -> Result<()> {
        let listing = self
            .list(Step::EnsureQueues, "gcloud tasks queues list")
            .await?;

        self.say("Creating task queues...");
        for queue in self.settings.queues.iter() {
            let existed = contains_resource(&listing, queue);
            ctx.decide("queue", queue, existed);
            if !existed {
                self.say(format!("Creating {queue}"));
                self.exec(&format!("gcloud tasks queues create {}", quote(queue)))
                    .await?;
            }
        }
        self.say("Done creating task queues");
        Ok(())
    }

    pub(super) async fn deploy_backend(&self) -> Result<()> {
        let backend = &self.settings.backend;
        let dir = checkout_dir(&backend.repository);

        self.say("Cloning code to deploy...");
        self.fresh_clone(&backend.repository, &dir).await?;
        self.say("Done cloning code");

        self.say("Creating datastore indexes...");
        self.exec(&format!(
            "gcloud datastore indexes create {} --quiet",
            quote(&format!("{dir}/index.yaml"))
        ))
            .await?;
        self.say("Done creating datastore indexes");

        self.say("Deploying app...");
        self.exec(&backend.deploy_command).await?;
        self.say("Done deploying app");
        Ok(())
    }

    pub(super) async fn publish_frontend(&self, ctx: &mut RunContext) -> Result<()> {
        let frontend = &self.settings.frontend;
        let dir = checkout_dir(&frontend.repository);
        let project = ctx.project().to_string();

        self.say("Cloning frontend...");
        self.fresh_clone(&frontend.repository, &dir).await?;
        self.say("Done cloning frontend");

        self.say("Installing frontend dependencies...");
        self.exec(&frontend.install_command).await?;
        self.say("Done installing frontend dependencies");

        self.say("Building frontend...");
        self.exec(&format!("{} {}", frontend.build_command, quote(&project)))
            .await?;
        self.say("Done building frontend");

        self.say("Creating frontend bucket...");
        let bucket_url = ctx.names.bucket_url.clone();
        let buckets = self
            .list(Step::PublishFrontend, &format!("gsutil ls -p {}", quote(&project)))
            .await?;
        let existed = contains_resource(&buckets, &bucket_url);
        ctx.decide("bucket", &bucket_url, existed);
        if !existed {
            self.exec(&format!(
                "gsutil mb -p {} -l {} {}",
                quote(&project),
                quote(&self.settings.bucket_location),
                quote(&bucket_url)
            ))
            .await?;
            self.exec(&format!("gsutil defacl ch -u AllUsers:R {}", quote(&bucket_url)))
                .await?;
        }
        self.say("Done creating frontend bucket");

        self.say("Deploying frontend...");
        // The glob is left for the shell to expand.
        self.exec(&format!(
            "gsutil -m cp -r {}/dist/* {}",
            quote(&dir),
            quote(&format!("{bucket_url}/"))
        ))
            .await?;
        self.say("Done deploying frontend");
        Ok(())
    }

    pub(super) async fn record_provenance(&self, ctx: &mut RunContext) -> Result<()> {
        self.say("Recording deployed revisions...");
        let secrets = self
            .list(Step::RecordProvenance, "gcloud secrets list --format='value(name)'")
            .await?;

        let components = [
            (&self.settings.backend.repository, &self.settings.backend.secret),
            (&self.settings.frontend.repository, &self.settings.frontend.secret),
        ];

        for (repository, secret) in components {
            let dir = checkout_dir(repository);
            let output = self
                .exec(&format!("git -C {} rev-parse HEAD", quote(&dir)))
                .await?;
            let revision = extract::revision_id(&output)?;

            let existed = contains_resource(&secrets, secret);
            ctx.decide("secret", secret, existed);
            if !existed {
                self.exec(&format!(
                    "gcloud secrets create {} --replication-policy=automatic --quiet",
                    quote(secret)
                ))
                .await?;
            }

            let file_name = format!("{secret}.json");
            let path = self.settings.work_dir.join(&file_name);
            let body = serde_json::to_vec(&RevisionRecord {
                revision: &revision,
            })?;
            tokio::fs::write(&path, body).await?;

            let added = self
                .exec(&format!(
                    "gcloud secrets versions add {} --data-file={}",
                    quote(secret),
                    quote(&file_name)
                ))
                .await;
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "could not remove revision file");
            }
            added?;
            info!(secret = %secret, revision = %revision, "revision recorded");
        }

        self.say("Done recording deployed revisions");
        Ok(())
    }

    pub(super) async fn schedule_jobs(&self, ctx: &mut RunContext) -> Result<()> {
        if self.settings.jobs.is_empty() {
            return Ok(());
        }
        let region = &self.settings.region;

        self.say("Scheduling update jobs...");
        let jobs = self
            .list(
                Step::ScheduleJobs,
                &format!(
                    "gcloud run jobs list --region={} --format='value(name)'",
                    quote(region)
                ),
            )
            .await?;

        for job in self.settings.jobs.iter() {
            let existed = contains_resource(&jobs, &job.name);
            ctx.decide("job", &job.name, existed);
            let verb = if existed { "update" } else { "create" };
            self.exec(&format!(
                "gcloud run jobs {verb} {} --image={} --region={} --memory={} --cpu={} --service-account={} --set-env-vars={} --quiet",
                quote(&job.name),
                quote(&job.image),
                quote(region),
                quote(&job.memory),
                quote(&job.cpu),
                quote(&ctx.names.service_identity),
                quote(&format!("PROJECT_ID={}", ctx.project()))
            ))
            .await?;
        }

        self.say("Done scheduling update jobs");
        Ok(())
    }

    pub(super) async fn revoke_credentials(&self, ctx: &RunContext) -> Result<()> {
        let key_id = ctx.key_id.as_deref().ok_or(ProvisionError::ParseError {
            what: "service account key id",
        })?;

        let deleted = self
            .exec(&format!(
                "gcloud iam service-accounts keys delete {} --iam-account={} --quiet",
                quote(key_id),
                quote(&ctx.names.service_identity)
            ))
            .await;

        // The local key file goes whether or not the remote delete worked.
        let path = self.settings.work_dir.join(&self.settings.credentials_file);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            debug!(path = %path.display(), error = %e, "credentials file not removed");
        }
        deleted?;
        Ok(())
    }

    pub(super) fn announce_completion(&self, ctx: &RunContext) -> Result<()> {
        let url = ctx.names.public_url.clone();
        self.say(format!("Access your new app at {url}"));
        self.sink.publish(ProgressEvent::Launch { url });
        Ok(())
    }

    /// Remove any previous checkout and clone fresh.
    async fn fresh_clone(&self, repository: &str, dir: &str) -> Result<()> {
        self.exec(&format!("rm -rf {}", quote(dir))).await?;
        self.exec(&format!("git clone {}", quote(repository))).await?;
        Ok(())
    }
}
