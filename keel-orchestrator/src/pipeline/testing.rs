//! Fakes and fixtures shared by the pipeline tests

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use keel_core::Codec;
use keel_core::domain::config::{Cni, Config, KubernetesSpec, NetworkSpec, RuntimeSpec};
use keel_core::domain::node::{Cri, NewNode, Node, NodeAuth, NodeRole};

use super::PipelineRunner;
use crate::error::{Error, Result};
use crate::repository::{ClusterRegistry, MemoryStore, PlanStore};
use crate::runtime::{ContainerClient, ContainerRuntime, ContainerSpec, ContainerSummary};
use crate::ssh::{RemoteFileFetcher, SshTarget};
use crate::template::TemplateRenderer;

pub fn specs(register: bool) -> (KubernetesSpec, NetworkSpec, RuntimeSpec) {
    (
        KubernetesSpec {
            enable_ha: false,
            api_server: None,
            kubernetes_version: "1.23.6".to_string(),
            register,
        },
        NetworkSpec {
            network_interface: "eth0".to_string(),
            cni: Cni::Calico,
            pod_network: "172.30.0.0/16".to_string(),
            service_subnet: "10.254.0.0/16".to_string(),
        },
        RuntimeSpec {
            runtime: Cri::Docker,
            image_repository: None,
        },
    )
}

pub fn config(plan_id: i64, register: bool) -> Config {
    let (kubernetes, network, runtime) = specs(register);
    let now = Utc::now();
    Config {
        id: plan_id,
        plan_id,
        name: "default".to_string(),
        region: None,
        kubernetes: kubernetes.marshal().unwrap(),
        network: network.marshal().unwrap(),
        runtime: runtime.marshal().unwrap(),
        description: None,
        resource_version: 1,
        created_at: now,
        updated_at: now,
    }
}

fn node_with_auth(
    plan_id: i64,
    name: &str,
    ip: &str,
    cri: Cri,
    role: NodeRole,
    auth: NodeAuth,
) -> Node {
    let now = Utc::now();
    Node {
        id: 0,
        name: name.to_string(),
        plan_id,
        role,
        ip: ip.to_string(),
        cri,
        auth: auth.marshal().unwrap(),
        resource_version: 1,
        created_at: now,
        updated_at: now,
    }
}

/// Password-authenticated node
pub fn node(plan_id: i64, name: &str, ip: &str, cri: Cri, role: NodeRole) -> Node {
    let auth = NodeAuth::Password {
        user: "root".to_string(),
        password: "secret".to_string(),
    };
    node_with_auth(plan_id, name, ip, cri, role, auth)
}

/// Key-authenticated docker master
pub fn key_node(plan_id: i64, name: &str, ip: &str, key: &str) -> Node {
    let auth = NodeAuth::Key {
        file: "id_rsa".to_string(),
        data: key.to_string(),
    };
    node_with_auth(plan_id, name, ip, Cri::Docker, NodeRole::Master, auth)
}

#[derive(Default)]
struct RuntimeState {
    containers: Vec<ContainerSummary>,
    created: Vec<ContainerSpec>,
    removed: Vec<String>,
    stopped: usize,
    exit_code: i64,
    wait_delay: Option<Duration>,
    next_id: usize,
}

/// In-memory container runtime that tracks open clients
#[derive(Default)]
pub struct FakeRuntime {
    state: Arc<Mutex<RuntimeState>>,
    open: Arc<AtomicUsize>,
}

impl FakeRuntime {
    pub fn seed(&self, id: &str, name: &str) {
        self.state.lock().unwrap().containers.push(ContainerSummary {
            id: id.to_string(),
            names: vec![name.to_string()],
        });
    }

    pub fn set_exit_code(&self, code: i64) {
        self.state.lock().unwrap().exit_code = code;
    }

    pub fn set_wait_delay(&self, delay: Duration) {
        self.state.lock().unwrap().wait_delay = Some(delay);
    }

    pub fn created(&self) -> Vec<ContainerSpec> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn removed_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }

    pub fn removed(&self) -> usize {
        self.state.lock().unwrap().removed.len()
    }

    pub fn stopped(&self) -> usize {
        self.state.lock().unwrap().stopped
    }

    pub fn open_clients(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn connect(&self) -> Result<Box<dyn ContainerClient>> {
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeClient {
            state: Arc::clone(&self.state),
            open: Arc::clone(&self.open),
        }))
    }
}

struct FakeClient {
    state: Arc<Mutex<RuntimeState>>,
    open: Arc<AtomicUsize>,
}

#[async_trait]
impl ContainerClient for FakeClient {
    async fn list(&self, _all: bool) -> Result<Vec<ContainerSummary>> {
        Ok(self.state.lock().unwrap().containers.clone())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.containers.iter().any(|c| c.has_name(&spec.name)) {
            return Err(Error::Execution(format!("name {} is in use", spec.name)));
        }
        state.next_id += 1;
        let id = format!("c{}", state.next_id);
        state.containers.push(ContainerSummary {
            id: id.clone(),
            names: vec![spec.name.clone()],
        });
        state.created.push(spec.clone());
        Ok(id)
    }

    async fn start(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn wait(&self, _id: &str) -> Result<i64> {
        let (delay, code) = {
            let state = self.state.lock().unwrap();
            (state.wait_delay, state.exit_code)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(code)
    }

    async fn stop(&self, _id: &str, _grace: Duration) -> Result<()> {
        self.state.lock().unwrap().stopped += 1;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.containers.retain(|c| c.id != id);
        state.removed.push(id.to_string());
        Ok(())
    }
}

impl Drop for FakeClient {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Serves files per host; unknown hosts fail to dial
#[derive(Default)]
pub struct FakeFetcher {
    files: Mutex<HashMap<String, Vec<u8>>>,
    requested: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn serve(&self, host: &str, contents: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(host.to_string(), contents.to_vec());
    }

    pub fn requested_hosts(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requested.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteFileFetcher for FakeFetcher {
    async fn fetch(&self, target: &SshTarget, _path: &str, _timeout: Duration) -> Result<Vec<u8>> {
        self.requested.lock().unwrap().push(target.host.clone());
        self.files
            .lock()
            .unwrap()
            .get(&target.host)
            .cloned()
            .ok_or_else(|| Error::Dial {
                host: target.host.clone(),
                message: "connection refused".to_string(),
            })
    }
}

/// A stored plan with two masters and a runner wired to fakes
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub runtime: Arc<FakeRuntime>,
    pub fetcher: Arc<FakeFetcher>,
    pub runner: PipelineRunner,
    pub plan_id: i64,
}

impl Fixture {
    pub async fn new(work_dir: &Path, register: bool) -> Self {
        let store = Arc::new(MemoryStore::new());
        let plan_id = store.create_plan("cluster-1", None).await.unwrap().id;

        let (kubernetes, network, runtime) = specs(register);
        store
            .create_config(keel_core::domain::config::NewConfig {
                plan_id,
                name: "default".to_string(),
                region: None,
                kubernetes: kubernetes.marshal().unwrap(),
                network: network.marshal().unwrap(),
                runtime: runtime.marshal().unwrap(),
                description: None,
            })
            .await
            .unwrap();

        for (name, ip) in [("master-1", "10.0.0.1"), ("master-2", "10.0.0.2")] {
            let template = node(plan_id, name, ip, Cri::Docker, NodeRole::Master);
            store
                .create_node(NewNode {
                    plan_id,
                    name: template.name,
                    role: template.role,
                    ip: template.ip,
                    cri: template.cri,
                    auth: template.auth,
                })
                .await
                .unwrap();
        }

        let runtime = Arc::new(FakeRuntime::default());
        let fetcher = Arc::new(FakeFetcher::default());
        let config = crate::config::Config::new(
            "postgres://localhost/keel".to_string(),
            work_dir.to_path_buf(),
        );

        let runner = PipelineRunner::new(
            Arc::clone(&store) as Arc<dyn PlanStore>,
            Arc::clone(&store) as Arc<dyn ClusterRegistry>,
            Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
            Arc::clone(&fetcher) as Arc<dyn RemoteFileFetcher>,
            Arc::new(TemplateRenderer::new().unwrap()),
            &config,
        );

        Self {
            store,
            runtime,
            fetcher,
            runner,
            plan_id,
        }
    }
}
