//! Installer container lifecycle
//!
//! BootStrap and Deploy both hand the rendered plan directory to the
//! installer image and differ only in the action they ask for. Each action
//! owns exactly one container per plan, named `keel-<action>-<plan_id>`; a
//! leftover from an earlier attempt is stopped and removed before a fresh one
//! is created. The finished container is kept until the next attempt so its
//! logs stay inspectable.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keel_core::domain::task::TaskStep;
use tracing::{debug, info, warn};

use super::{Handler, TaskData};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::runtime::{ContainerClient, ContainerRuntime, ContainerSpec};
use crate::template::{CONFIG_MOUNT, plan_dir};

/// What the installer is asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Bootstrap,
    Deploy,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Bootstrap => "bootstrap",
            Action::Deploy => "deploy",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Deterministic container name of an (action, plan) pair
pub fn container_name(action: Action, plan_id: i64) -> String {
    format!("keel-{}-{}", action, plan_id)
}

/// Runs installer containers to completion
pub struct NodeBootstrapper {
    runtime: Arc<dyn ContainerRuntime>,
    image: String,
    work_dir: PathBuf,
    timeout: Duration,
    stop_grace: Duration,
}

impl NodeBootstrapper {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: &Config) -> Self {
        Self {
            runtime,
            image: config.installer_image.clone(),
            work_dir: config.work_dir.clone(),
            timeout: config.container_timeout,
            stop_grace: config.stop_grace,
        }
    }

    /// Runs `action` for a plan and waits for the container to exit
    ///
    /// The runtime client is acquired here and dropped on return.
    pub async fn run(&self, action: Action, plan_id: i64) -> Result<()> {
        let client = self.runtime.connect().await?;
        let name = container_name(action, plan_id);

        self.remove_stale(client.as_ref(), &name).await?;

        let spec = ContainerSpec {
            name: name.clone(),
            image: self.image.clone(),
            env: vec![
                ("COMMAND".to_string(), action.to_string()),
                ("PLAN_ID".to_string(), plan_id.to_string()),
            ],
            mounts: vec![(plan_dir(&self.work_dir, plan_id), CONFIG_MOUNT.to_string())],
        };

        let id = client.create(&spec).await?;
        client.start(&id).await?;
        info!("Started {} for plan {}", name, plan_id);

        match tokio::time::timeout(self.timeout, client.wait(&id)).await {
            Ok(Ok(0)) => {
                info!("{} finished successfully", name);
                Ok(())
            }
            Ok(Ok(code)) => Err(Error::Execution(format!(
                "{} exited with code {}",
                name, code
            ))),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!("{} timed out after {:?}, stopping it", name, self.timeout);
                if let Err(e) = client.stop(&id, self.stop_grace).await {
                    warn!("Failed to stop {}: {}", name, e);
                }
                Err(Error::Execution(format!(
                    "{} timed out after {}s",
                    name,
                    self.timeout.as_secs()
                )))
            }
        }
    }

    /// Stops and removes any container, running or not, named `name`
    async fn remove_stale(&self, client: &dyn ContainerClient, name: &str) -> Result<()> {
        let stale = client
            .list(true)
            .await?
            .into_iter()
            .filter(|container| container.has_name(name));

        for container in stale {
            debug!("Removing stale container {} ({})", name, container.id);
            // Already exited containers reject stop; remove is forced anyway
            if let Err(e) = client.stop(&container.id, self.stop_grace).await {
                debug!("Stop of {} failed: {}", container.id, e);
            }
            client.remove(&container.id).await?;
        }

        Ok(())
    }
}

pub struct BootStrapHandler {
    data: Arc<TaskData>,
    bootstrapper: Arc<NodeBootstrapper>,
}

impl BootStrapHandler {
    pub fn new(data: Arc<TaskData>, bootstrapper: Arc<NodeBootstrapper>) -> Self {
        Self { data, bootstrapper }
    }
}

#[async_trait]
impl Handler for BootStrapHandler {
    fn plan_id(&self) -> i64 {
        self.data.plan_id
    }

    fn name(&self) -> &'static str {
        "BootStrap"
    }

    fn step(&self) -> TaskStep {
        TaskStep::Running
    }

    async fn run(&self) -> Result<()> {
        self.bootstrapper
            .run(Action::Bootstrap, self.data.plan_id)
            .await
    }
}

pub struct DeployHandler {
    data: Arc<TaskData>,
    bootstrapper: Arc<NodeBootstrapper>,
    /// Whether this is the last handler of the run
    terminal: bool,
}

impl DeployHandler {
    pub fn new(data: Arc<TaskData>, bootstrapper: Arc<NodeBootstrapper>, terminal: bool) -> Self {
        Self {
            data,
            bootstrapper,
            terminal,
        }
    }
}

#[async_trait]
impl Handler for DeployHandler {
    fn plan_id(&self) -> i64 {
        self.data.plan_id
    }

    fn name(&self) -> &'static str {
        "Deploy"
    }

    fn step(&self) -> TaskStep {
        if self.terminal {
            TaskStep::Completed
        } else {
            TaskStep::Running
        }
    }

    async fn run(&self) -> Result<()> {
        self.bootstrapper
            .run(Action::Deploy, self.data.plan_id)
            .await
    }
}
