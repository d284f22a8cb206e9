//! Cluster registration
//!
//! Pulls the admin kubeconfig off the first master that serves one and
//! hands it, base64-encoded, to the cluster registry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use keel_core::Codec;
use keel_core::domain::cluster::Cluster;
use keel_core::domain::node::{Node, NodeAuth};
use keel_core::domain::task::TaskStep;
use tracing::{info, warn};

use super::{Handler, REGISTER, TaskData};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::repository::ClusterRegistry;
use crate::ssh::{RemoteFileFetcher, SshTarget};

pub struct ClusterRegistrar {
    fetcher: Arc<dyn RemoteFileFetcher>,
    registry: Arc<dyn ClusterRegistry>,
    ssh_port: u16,
    dial_timeout: Duration,
    kubeconfig_path: String,
}

impl ClusterRegistrar {
    pub fn new(
        fetcher: Arc<dyn RemoteFileFetcher>,
        registry: Arc<dyn ClusterRegistry>,
        config: &Config,
    ) -> Self {
        Self {
            fetcher,
            registry,
            ssh_port: config.ssh_port,
            dial_timeout: config.ssh_dial_timeout,
            kubeconfig_path: config.kubeconfig_path.clone(),
        }
    }

    /// Returns the kubeconfig of the first master yielding a non-empty file
    ///
    /// Masters are tried in plan order. When none succeeds the last failure
    /// is returned.
    pub async fn fetch_kubeconfig<'a, I>(&self, masters: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = &'a Node>,
    {
        let mut last_error = None;

        for node in masters {
            match self.fetch_from(node).await {
                Ok(contents) if !contents.is_empty() => {
                    info!("Fetched kubeconfig from {} ({})", node.name, node.ip);
                    return Ok(contents);
                }
                Ok(_) => {
                    warn!("Kubeconfig on {} is empty", node.name);
                    last_error = Some(Error::Validation(format!(
                        "{} on {} is empty",
                        self.kubeconfig_path, node.name
                    )));
                }
                Err(e) => {
                    warn!("Failed to fetch kubeconfig from {}: {}", node.name, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::Validation("plan has no master node".to_string())))
    }

    async fn fetch_from(&self, node: &Node) -> Result<Vec<u8>> {
        let target = SshTarget {
            host: node.ip.clone(),
            port: self.ssh_port,
            auth: NodeAuth::unmarshal(&node.auth)?,
        };
        self.fetcher
            .fetch(&target, &self.kubeconfig_path, self.dial_timeout)
            .await
    }

    /// Fetches, encodes and registers the cluster of a plan
    pub async fn register(&self, data: &TaskData) -> Result<Cluster> {
        let kubeconfig = self.fetch_kubeconfig(data.masters()).await?;
        let encoded = STANDARD.encode(kubeconfig);

        let cluster = self
            .registry
            .register_cluster(data.plan_id, &encoded)
            .await?;
        info!("Registered cluster {} for plan {}", cluster.id, data.plan_id);

        Ok(cluster)
    }
}

pub struct RegisterHandler {
    data: Arc<TaskData>,
    registrar: Arc<ClusterRegistrar>,
}

impl RegisterHandler {
    pub fn new(data: Arc<TaskData>, registrar: Arc<ClusterRegistrar>) -> Self {
        Self { data, registrar }
    }
}

#[async_trait]
impl Handler for RegisterHandler {
    fn plan_id(&self) -> i64 {
        self.data.plan_id
    }

    fn name(&self) -> &'static str {
        REGISTER
    }

    fn step(&self) -> TaskStep {
        TaskStep::Completed
    }

    async fn run(&self) -> Result<()> {
        if !self.data.kubernetes()?.register {
            info!(
                "Registration disabled for plan {}, skipping",
                self.data.plan_id
            );
            return Ok(());
        }

        self.registrar.register(&self.data).await?;
        Ok(())
    }
}
