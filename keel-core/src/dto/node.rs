//! Node DTOs

use serde::{Deserialize, Serialize};

use crate::domain::node::{Cri, NodeAuth, NodeRole};

/// Request to add a node to a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNode {
    pub name: String,
    pub role: NodeRole,
    pub ip: String,
    pub cri: Cri,
    pub auth: NodeAuth,
}
