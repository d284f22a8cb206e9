//! Task pipeline
//!
//! One run of a plan walks a fixed, linear list of handlers:
//!
//! ```text
//! Check -> Render -> BootStrap -> Deploy [-> Register]
//! ```
//!
//! Every handler owns one task row keyed by `(plan_id, name)`. The row is
//! fetched or created before the handler runs and overwritten with its
//! outcome afterwards, so the task list of a plan always shows the last
//! result of every step that was reached. The first failing handler stops
//! the run.

pub mod bootstrap;
pub mod check;
pub mod register;
pub mod render;

#[cfg(test)]
pub(crate) mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use keel_core::Codec;
use keel_core::domain::config::{Config, KubernetesSpec, NetworkSpec, RuntimeSpec};
use keel_core::domain::node::Node;
use keel_core::domain::task::{NewTask, Task, TaskStatus, TaskStep, TaskUpdate};
use tracing::{debug, info, warn};

pub use bootstrap::{Action, BootStrapHandler, DeployHandler, NodeBootstrapper};
pub use check::CheckHandler;
pub use register::{ClusterRegistrar, RegisterHandler};
pub use render::RenderHandler;

use crate::error::{Error, Result};
use crate::repository::{ClusterRegistry, PlanStore, StoreError};
use crate::runtime::ContainerRuntime;
use crate::ssh::RemoteFileFetcher;
use crate::template::TemplateRenderer;

/// One stage of the pipeline
#[async_trait]
pub trait Handler: Send + Sync {
    fn plan_id(&self) -> i64;

    /// Stable identity, used as the task name
    fn name(&self) -> &'static str;

    /// Step recorded when `run` succeeds
    fn step(&self) -> TaskStep;

    async fn run(&self) -> Result<()>;
}

/// Read-only inputs shared by every handler of a run
#[derive(Debug, Clone)]
pub struct TaskData {
    pub plan_id: i64,
    pub config: Config,
    /// In plan order
    pub nodes: Vec<Node>,
}

impl TaskData {
    pub fn kubernetes(&self) -> Result<KubernetesSpec> {
        Ok(KubernetesSpec::unmarshal(&self.config.kubernetes)?)
    }

    pub fn network(&self) -> Result<NetworkSpec> {
        Ok(NetworkSpec::unmarshal(&self.config.network)?)
    }

    pub fn runtime(&self) -> Result<RuntimeSpec> {
        Ok(RuntimeSpec::unmarshal(&self.config.runtime)?)
    }

    pub fn masters(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|node| node.is_master())
    }
}

/// Loads the nodes and config of a plan
///
/// A plan without a config cannot run.
pub async fn get_task_data(store: &dyn PlanStore, plan_id: i64) -> Result<TaskData> {
    let nodes = store.list_nodes(plan_id).await?;
    let config = store
        .get_config(plan_id)
        .await?
        .ok_or_else(|| Error::not_found("config", format!("of plan {}", plan_id)))?;

    Ok(TaskData {
        plan_id,
        config,
        nodes,
    })
}

/// Runs `handlers` in order, recording each outcome on its task row
///
/// Stops at the first failing handler and returns
/// [`Error::HandlerFailed`]. A stale resource version on a task row is
/// returned as-is and also ends the run.
pub async fn sync_tasks(store: &dyn PlanStore, handlers: &[Box<dyn Handler>]) -> Result<()> {
    for handler in handlers {
        let name = handler.name();
        let task = get_or_create_task(store, handler.plan_id(), name).await?;

        info!("Plan {}: running {}", handler.plan_id(), name);
        let outcome = handler.run().await;

        let update = match &outcome {
            Ok(()) => TaskUpdate {
                step: Some(handler.step()),
                status: Some(TaskStatus::Success),
                message: Some(String::new()),
            },
            Err(e) => TaskUpdate {
                step: Some(TaskStep::Failed),
                status: Some(TaskStatus::Failed),
                message: Some(e.to_string()),
            },
        };

        let task = store
            .update_task(task.id, task.resource_version, update)
            .await?;
        debug!(
            "Plan {}: task {} is now {}/{} (rv {})",
            task.plan_id, task.name, task.step, task.status, task.resource_version
        );

        if let Err(e) = outcome {
            warn!("Plan {}: {} failed: {}", handler.plan_id(), name, e);
            return Err(Error::HandlerFailed {
                name,
                source: Box::new(e),
            });
        }
    }

    Ok(())
}

async fn get_or_create_task(store: &dyn PlanStore, plan_id: i64, name: &str) -> Result<Task> {
    if let Some(task) = store.get_task(plan_id, name).await? {
        return Ok(task);
    }

    let new_task = NewTask {
        plan_id,
        name: name.to_string(),
        step: TaskStep::Running,
        status: TaskStatus::Pending,
        message: String::new(),
    };

    match store.create_task(new_task).await {
        Ok(task) => Ok(task),
        // Lost the race against a concurrent run of the same plan
        Err(StoreError::AlreadyExists(_)) => store
            .get_task(plan_id, name)
            .await?
            .ok_or_else(|| Error::not_found("task", format!("{} of plan {}", name, plan_id))),
        Err(e) => Err(e.into()),
    }
}

/// Task name of the registration handler
const REGISTER: &str = "Register";

/// Builds and runs the handler list of a plan
pub struct PipelineRunner {
    store: Arc<dyn PlanStore>,
    renderer: Arc<TemplateRenderer>,
    bootstrapper: Arc<NodeBootstrapper>,
    registrar: Arc<ClusterRegistrar>,
    work_dir: PathBuf,
}

impl PipelineRunner {
    pub fn new(
        store: Arc<dyn PlanStore>,
        registry: Arc<dyn ClusterRegistry>,
        runtime: Arc<dyn ContainerRuntime>,
        fetcher: Arc<dyn RemoteFileFetcher>,
        renderer: Arc<TemplateRenderer>,
        config: &crate::config::Config,
    ) -> Self {
        let bootstrapper = Arc::new(NodeBootstrapper::new(runtime, config));
        let registrar = Arc::new(ClusterRegistrar::new(fetcher, registry, config));

        Self {
            store,
            renderer,
            bootstrapper,
            registrar,
            work_dir: config.work_dir.clone(),
        }
    }

    /// Runs the pipeline once for `plan_id`
    pub async fn run(&self, plan_id: i64) -> Result<()> {
        let data = Arc::new(get_task_data(self.store.as_ref(), plan_id).await?);
        let handlers = self.handlers(data);

        // The audit trail only lists handlers of the current list
        if !handlers.iter().any(|h| h.name() == REGISTER) {
            if let Some(task) = self.store.get_task(plan_id, REGISTER).await? {
                self.store.delete_task(task.id).await?;
                info!("Plan {}: registration disabled, dropped its task row", plan_id);
            }
        }

        info!(
            "Plan {}: starting pipeline with {} handler(s)",
            plan_id,
            handlers.len()
        );
        sync_tasks(self.store.as_ref(), &handlers).await?;
        info!("Plan {}: pipeline completed", plan_id);

        Ok(())
    }

    /// Handler list for a run
    ///
    /// Register is appended only when registration is enabled. The last
    /// handler records `Completed`. A config that does not decode leaves
    /// registration off; Check then fails the run on it.
    pub fn handlers(&self, data: Arc<TaskData>) -> Vec<Box<dyn Handler>> {
        let register = data.kubernetes().map(|k| k.register).unwrap_or(false);

        let mut handlers: Vec<Box<dyn Handler>> = vec![
            Box::new(CheckHandler::new(Arc::clone(&data))),
            Box::new(RenderHandler::new(
                Arc::clone(&data),
                Arc::clone(&self.renderer),
                self.work_dir.clone(),
            )),
            Box::new(BootStrapHandler::new(
                Arc::clone(&data),
                Arc::clone(&self.bootstrapper),
            )),
            Box::new(DeployHandler::new(
                Arc::clone(&data),
                Arc::clone(&self.bootstrapper),
                !register,
            )),
        ];

        if register {
            handlers.push(Box::new(RegisterHandler::new(
                data,
                Arc::clone(&self.registrar),
            )));
        }

        handlers
    }
}
