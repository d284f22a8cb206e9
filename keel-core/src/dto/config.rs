//! Config DTOs

use serde::{Deserialize, Serialize};

use crate::domain::config::{KubernetesSpec, NetworkSpec, RuntimeSpec};

/// Request to attach the cluster config to a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConfig {
    pub name: String,
    pub region: Option<String>,
    pub kubernetes: KubernetesSpec,
    pub network: NetworkSpec,
    pub runtime: RuntimeSpec,
    pub description: Option<String>,
}
