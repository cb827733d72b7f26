// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod server;
pub mod session;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, default_config_path, load_and_validate, load_or_default};
use crate::engine::Engine;
use crate::exec::ShellRunner;
use crate::pipeline::{Step, names::checkout_dir};
use crate::progress::Heartbeat;
use crate::server::AppState;
use crate::session::{ProcessSpawner, SessionBroker};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - shell runner and login spawner
/// - session broker and engine
/// - heartbeat + HTTP/WebSocket server
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = match &args.config {
        Some(path) => load_and_validate(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => load_or_default(default_config_path()).context("loading default config")?,
    };

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let port = args.port.unwrap_or(cfg.server.port);
    let work_dir = cfg.pipeline.work_dir.clone();
    info!(port, work_dir = %work_dir.display(), "starting cloudstrap");

    let runner = Arc::new(ShellRunner::new(&work_dir));
    let spawner = Arc::new(ProcessSpawner::new(&work_dir));
    let broker = SessionBroker::new(spawner, cfg.login.clone());
    let heartbeat = Arc::new(Heartbeat::new(cfg.server.keep_alive_interval));
    let engine = Arc::new(Engine::new(Arc::new(cfg), broker, runner));

    server::serve(AppState { engine, heartbeat }, port).await
}

/// Print the resolved pipeline without executing anything.
fn print_dry_run(cfg: &ConfigFile) {
    let p = &cfg.pipeline;
    println!("cloudstrap dry-run");
    println!("  server.port = {}", cfg.server.port);
    println!(
        "  retry = {} attempts, {:?} backoff, {:?} timeout",
        cfg.retry.max_attempts, cfg.retry.backoff, cfg.retry.command_timeout
    );
    println!("  login.command = {}", cfg.login.command);
    println!("  work_dir = {}", p.work_dir.display());
    println!();

    println!("steps ({}):", Step::ALL.len());
    for (i, step) in Step::ALL.iter().enumerate() {
        println!("  {:>2}. {step} [{}]", i + 1, step.policy());
    }
    println!();

    println!("  region: {}", p.region);
    println!("  services: {:?}", p.services);
    println!("  roles: {:?}", p.roles);
    println!("  queues: {:?}", p.queues);
    println!(
        "  backend: {} -> {}/ (secret {})",
        p.backend.repository,
        checkout_dir(&p.backend.repository),
        p.backend.secret
    );
    println!(
        "  frontend: {} -> {}/ (secret {})",
        p.frontend.repository,
        checkout_dir(&p.frontend.repository),
        p.frontend.secret
    );
    for job in p.jobs.iter() {
        println!("  job {}: image {} memory {} cpu {}", job.name, job.image, job.memory, job.cpu);
    }

    debug!("dry-run complete (no execution)");
}
