//! Node domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SSH user assumed for key based authentication
pub const DEFAULT_KEY_USER: &str = "root";

/// A bare-metal machine that belongs to a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub name: String,
    pub plan_id: i64,
    pub role: NodeRole,
    pub ip: String,
    pub cri: Cri,
    /// Encoded [`NodeAuth`]
    pub auth: String,
    pub resource_version: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Kubernetes role of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    Master,
    Node,
}

/// Container runtime a node is provisioned with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cri {
    Docker,
    Containerd,
}

/// SSH credential material for a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeAuth {
    Password { user: String, password: String },
    /// `file` is the name the key was uploaded under, `data` the PEM contents
    Key { file: String, data: String },
}

impl NodeAuth {
    /// User the node is reached as
    pub fn user(&self) -> &str {
        match self {
            NodeAuth::Password { user, .. } => user,
            NodeAuth::Key { .. } => DEFAULT_KEY_USER,
        }
    }
}

/// Request to create a node row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNode {
    pub plan_id: i64,
    pub name: String,
    pub role: NodeRole,
    pub ip: String,
    pub cri: Cri,
    pub auth: String,
}

/// Partial update of a node. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub name: Option<String>,
    pub role: Option<NodeRole>,
    pub ip: Option<String>,
    pub cri: Option<Cri>,
    pub auth: Option<String>,
}

impl Node {
    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Master => "Master",
            NodeRole::Node => "Node",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Master" => Ok(NodeRole::Master),
            "Node" => Ok(NodeRole::Node),
            other => Err(format!("unknown node role '{}'", other)),
        }
    }
}

impl Cri {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cri::Docker => "docker",
            Cri::Containerd => "containerd",
        }
    }
}

impl fmt::Display for Cri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cri {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "docker" => Ok(Cri::Docker),
            "containerd" => Ok(Cri::Containerd),
            other => Err(format!("unknown container runtime '{}'", other)),
        }
    }
}
