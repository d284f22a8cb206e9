//! Cluster-wide installer variables

use keel_core::domain::config::{KubernetesSpec, NetworkSpec, RuntimeSpec};
use serde::Serialize;

/// Values substituted into `globals.yml`
#[derive(Debug, Clone, Serialize)]
pub struct Globals {
    pub kube_release: String,
    pub enable_ha: bool,
    pub kube_vip_address: Option<String>,
    pub network_interface: String,
    pub cluster_cidr: String,
    pub service_cidr: String,
    pub cni: &'static str,
    pub container_runtime: &'static str,
    pub image_repository: Option<String>,
}

impl Globals {
    pub fn from_specs(
        kubernetes: &KubernetesSpec,
        network: &NetworkSpec,
        runtime: &RuntimeSpec,
    ) -> Self {
        Self {
            kube_release: kubernetes.kubernetes_version.clone(),
            enable_ha: kubernetes.enable_ha,
            kube_vip_address: kubernetes
                .api_server
                .clone()
                .filter(|address| !address.is_empty()),
            network_interface: network.network_interface.clone(),
            cluster_cidr: network.pod_network.clone(),
            service_cidr: network.service_subnet.clone(),
            cni: network.cni.as_str(),
            container_runtime: runtime.runtime.as_str(),
            image_repository: runtime.image_repository.clone(),
        }
    }
}
