//! Pre-flight validation of run data

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use keel_core::Codec;
use keel_core::domain::node::NodeAuth;
use keel_core::domain::task::TaskStep;

use super::{Handler, TaskData};
use crate::error::{Error, Result};

/// Rejects plans the later steps cannot work with
pub struct CheckHandler {
    data: Arc<TaskData>,
}

impl CheckHandler {
    pub fn new(data: Arc<TaskData>) -> Self {
        Self { data }
    }
}

#[async_trait]
impl Handler for CheckHandler {
    fn plan_id(&self) -> i64 {
        self.data.plan_id
    }

    fn name(&self) -> &'static str {
        "Check"
    }

    fn step(&self) -> TaskStep {
        TaskStep::Running
    }

    async fn run(&self) -> Result<()> {
        validate(&self.data)
    }
}

fn validate(data: &TaskData) -> Result<()> {
    if data.nodes.is_empty() {
        return Err(Error::Validation(format!(
            "plan {} has no nodes",
            data.plan_id
        )));
    }

    if data.masters().next().is_none() {
        return Err(Error::Validation(format!(
            "plan {} has no master node",
            data.plan_id
        )));
    }

    let mut names = HashSet::new();
    for node in &data.nodes {
        validate_node_name(&node.name)?;

        if !names.insert(node.name.as_str()) {
            return Err(Error::Validation(format!(
                "duplicate node name '{}'",
                node.name
            )));
        }

        if node.ip.parse::<IpAddr>().is_err() {
            return Err(Error::Validation(format!(
                "node '{}' has an invalid ip '{}'",
                node.name, node.ip
            )));
        }

        NodeAuth::unmarshal(&node.auth)?;
    }

    let kubernetes = data.kubernetes()?;
    data.network()?;
    data.runtime()?;

    let has_vip = kubernetes
        .api_server
        .as_deref()
        .is_some_and(|vip| !vip.trim().is_empty());
    if kubernetes.enable_ha && !has_vip {
        return Err(Error::Validation(
            "high availability requires an api server address".to_string(),
        ));
    }

    Ok(())
}

/// Node names become directory names under the plan directory
pub(crate) fn validate_node_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        return Err(Error::Validation(format!(
            "node name '{}' cannot be used as a path component",
            name
        )));
    }
    Ok(())
}
