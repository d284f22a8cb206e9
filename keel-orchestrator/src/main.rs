//! Keel Orchestrator binary
//!
//! Connects to Postgres, wires the pipeline and runs the worker pool until
//! Ctrl-C. Plan IDs given as arguments are scheduled at startup.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keel_orchestrator::config::Config;
use keel_orchestrator::db;
use keel_orchestrator::pipeline::PipelineRunner;
use keel_orchestrator::repository::{ClusterRegistry, PgStore, PlanStore};
use keel_orchestrator::runtime::{ContainerRuntime, PodmanRuntime};
use keel_orchestrator::scheduler::worker::PlanProcessor;
use keel_orchestrator::scheduler::{WorkQueue, WorkerPool};
use keel_orchestrator::service::plan_service;
use keel_orchestrator::ssh::{RemoteFileFetcher, Ssh2Fetcher};
use keel_orchestrator::template::TemplateRenderer;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keel_orchestrator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Keel Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    info!(
        "Loaded configuration: work_dir={}, workers={}, image={}",
        config.work_dir.display(),
        config.worker_count,
        config.installer_image
    );

    info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let runtime = PodmanRuntime::new(config.container_cli.clone());
    runtime
        .check_available()
        .await
        .context("Container runtime is not available")?;

    let renderer = TemplateRenderer::new().context("Failed to load templates")?;

    let store = Arc::new(PgStore::new(pool));
    let runner = PipelineRunner::new(
        Arc::clone(&store) as Arc<dyn PlanStore>,
        Arc::clone(&store) as Arc<dyn ClusterRegistry>,
        Arc::new(runtime) as Arc<dyn ContainerRuntime>,
        Arc::new(Ssh2Fetcher::new()) as Arc<dyn RemoteFileFetcher>,
        Arc::new(renderer),
        &config,
    );

    let queue = Arc::new(WorkQueue::new());
    let pool = WorkerPool::new(
        Arc::clone(&queue),
        Arc::new(runner) as Arc<dyn PlanProcessor>,
    );

    for arg in std::env::args().skip(1) {
        let plan_id: i64 = arg
            .parse()
            .with_context(|| format!("'{}' is not a plan id", arg))?;
        if let Err(e) = plan_service::start_plan(store.as_ref(), &queue, plan_id).await {
            warn!("Not scheduling plan {}: {}", plan_id, e);
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    pool.run(shutdown_rx, config.worker_count).await;

    info!("Keel Orchestrator stopped");
    Ok(())
}
