//! Config domain types
//!
//! A plan's config row carries three structured specs as opaque text; see
//! [`crate::codec`] for how they are encoded.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::node::Cri;

/// Cluster configuration attached to a plan (exactly one per plan)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub id: i64,
    pub plan_id: i64,
    pub name: String,
    pub region: Option<String>,
    /// Encoded [`KubernetesSpec`]
    pub kubernetes: String,
    /// Encoded [`NetworkSpec`]
    pub network: String,
    /// Encoded [`RuntimeSpec`]
    pub runtime: String,
    pub description: Option<String>,
    pub resource_version: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Kubernetes parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesSpec {
    #[serde(default)]
    pub enable_ha: bool,
    /// Virtual address of the API server, required for HA
    #[serde(default)]
    pub api_server: Option<String>,
    pub kubernetes_version: String,
    /// Register the cluster once deployed
    #[serde(default)]
    pub register: bool,
}

/// Pod network parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    pub network_interface: String,
    pub cni: Cni,
    pub pod_network: String,
    pub service_subnet: String,
}

/// CNI plugin selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cni {
    Calico,
    Flannel,
}

/// Container runtime parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSpec {
    pub runtime: Cri,
    #[serde(default)]
    pub image_repository: Option<String>,
}

/// Request to create a config row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConfig {
    pub plan_id: i64,
    pub name: String,
    pub region: Option<String>,
    pub kubernetes: String,
    pub network: String,
    pub runtime: String,
    pub description: Option<String>,
}

/// Partial update of a config. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub name: Option<String>,
    pub region: Option<String>,
    pub kubernetes: Option<String>,
    pub network: Option<String>,
    pub runtime: Option<String>,
    pub description: Option<String>,
}

impl Cni {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cni::Calico => "calico",
            Cni::Flannel => "flannel",
        }
    }
}

impl fmt::Display for Cni {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
