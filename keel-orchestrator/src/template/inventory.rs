//! Ansible inventory grouping
//!
//! Nodes are partitioned in a single pass into four disjoint groups keyed by
//! (container runtime, role). Credentials are resolved per node: passwords
//! are inlined into the host line, private keys are written next to the
//! inventory and referenced by their path inside the installer container.

use std::path::{Path, PathBuf};

use keel_core::Codec;
use keel_core::domain::node::{Cri, Node, NodeAuth, NodeRole};
use serde::Serialize;

use super::key_path;
use crate::error::Result;

/// Host lines per inventory group
#[derive(Debug, Default, Serialize)]
pub struct Inventory {
    pub docker_master: Vec<String>,
    pub docker_node: Vec<String>,
    pub containerd_master: Vec<String>,
    pub containerd_node: Vec<String>,
}

/// A private key to materialize for a key-authenticated node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFile {
    pub path: PathBuf,
    pub data: String,
}

impl Inventory {
    /// Groups `nodes` and resolves their credentials
    ///
    /// Key files are planned under `plan_dir`, while host lines reference
    /// them under `mount_dir`, where the installer sees the plan directory.
    /// Nothing is written here.
    pub fn build(
        nodes: &[Node],
        plan_dir: &Path,
        mount_dir: &Path,
    ) -> Result<(Self, Vec<KeyFile>)> {
        let mut inventory = Self::default();
        let mut keys = Vec::new();

        for node in nodes {
            let auth = NodeAuth::unmarshal(&node.auth)?;
            let credentials = match &auth {
                NodeAuth::Password { password, .. } => {
                    format!("ansible_ssh_pass={}", quote(password))
                }
                NodeAuth::Key { data, .. } => {
                    let line = format!(
                        "ansible_ssh_private_key_file={}",
                        key_path(mount_dir, &node.name).display()
                    );
                    keys.push(KeyFile {
                        path: key_path(plan_dir, &node.name),
                        data: data.clone(),
                    });
                    line
                }
            };

            let host = format!(
                "{} ansible_host={} ansible_ssh_user={} {}",
                node.name,
                node.ip,
                auth.user(),
                credentials
            );
            inventory.group_mut(node.cri, node.role).push(host);
        }

        Ok((inventory, keys))
    }

    fn group_mut(&mut self, cri: Cri, role: NodeRole) -> &mut Vec<String> {
        match (cri, role) {
            (Cri::Docker, NodeRole::Master) => &mut self.docker_master,
            (Cri::Docker, NodeRole::Node) => &mut self.docker_node,
            (Cri::Containerd, NodeRole::Master) => &mut self.containerd_master,
            (Cri::Containerd, NodeRole::Node) => &mut self.containerd_node,
        }
    }
}

/// Double-quotes an inventory value
///
/// Ansible splits host lines shell-style, so quoting keeps whitespace and `#`
/// inside the value; `"` and `\` are backslash-escaped.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
