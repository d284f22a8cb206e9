//! Plan Service
//!
//! Validated writes that make a plan runnable, the query surface over its
//! task audit trail, and scheduling.

use std::net::IpAddr;

use keel_core::Codec;
use keel_core::domain::config::Config;
use keel_core::domain::node::{NewNode, Node, NodeAuth};
use keel_core::domain::plan::Plan;
use keel_core::domain::task::Task;
use keel_core::dto::config::CreateConfig;
use keel_core::dto::node::CreateNode;
use keel_core::dto::plan::CreatePlan;

use crate::error::{Error, Result};
use crate::pipeline::check::validate_node_name;
use crate::repository::PlanStore;
use crate::scheduler::WorkQueue;

const MAX_NAME_LEN: usize = 255;

/// Create a new plan
pub async fn create_plan(store: &dyn PlanStore, req: CreatePlan) -> Result<Plan> {
    validate_name("plan", &req.name)?;

    let plan = store
        .create_plan(req.name.trim(), req.description.as_deref())
        .await?;

    tracing::info!("Plan created: {} ({})", plan.id, plan.name);
    Ok(plan)
}

/// Attach the config to a plan
pub async fn create_config(
    store: &dyn PlanStore,
    plan_id: i64,
    req: CreateConfig,
) -> Result<Config> {
    ensure_plan(store, plan_id).await?;
    validate_config(&req)?;

    let config = store
        .create_config(keel_core::domain::config::NewConfig {
            plan_id,
            name: req.name.trim().to_string(),
            region: req.region,
            kubernetes: req.kubernetes.marshal()?,
            network: req.network.marshal()?,
            runtime: req.runtime.marshal()?,
            description: req.description,
        })
        .await?;

    tracing::info!("Config {} created for plan {}", config.id, plan_id);
    Ok(config)
}

/// Add a node to a plan
pub async fn create_node(store: &dyn PlanStore, plan_id: i64, req: CreateNode) -> Result<Node> {
    ensure_plan(store, plan_id).await?;
    validate_node(&req)?;

    let name = req.name.trim().to_string();
    let existing = store.list_nodes(plan_id).await?;
    if existing.iter().any(|node| node.name == name) {
        return Err(Error::Validation(format!(
            "plan {} already has a node named '{}'",
            plan_id, name
        )));
    }

    let node = store
        .create_node(NewNode {
            plan_id,
            name,
            role: req.role,
            ip: req.ip,
            cri: req.cri,
            auth: req.auth.marshal()?,
        })
        .await?;

    tracing::info!("Node {} ({}) added to plan {}", node.name, node.role, plan_id);
    Ok(node)
}

/// Schedule a run of a plan
pub async fn start_plan(store: &dyn PlanStore, queue: &WorkQueue, plan_id: i64) -> Result<()> {
    ensure_plan(store, plan_id).await?;

    if queue.is_shutting_down() {
        return Err(Error::Validation(
            "orchestrator is shutting down".to_string(),
        ));
    }

    queue.add(plan_id);
    tracing::info!("Plan {} scheduled", plan_id);
    Ok(())
}

/// Get a plan by ID
pub async fn get_plan(store: &dyn PlanStore, plan_id: i64) -> Result<Plan> {
    ensure_plan(store, plan_id).await
}

/// List all plans
pub async fn list_plans(store: &dyn PlanStore) -> Result<Vec<Plan>> {
    Ok(store.list_plans().await?)
}

/// List the nodes of a plan
pub async fn list_nodes(store: &dyn PlanStore, plan_id: i64) -> Result<Vec<Node>> {
    ensure_plan(store, plan_id).await?;
    Ok(store.list_nodes(plan_id).await?)
}

/// Get the config of a plan
pub async fn get_config(store: &dyn PlanStore, plan_id: i64) -> Result<Config> {
    ensure_plan(store, plan_id).await?;
    store
        .get_config(plan_id)
        .await?
        .ok_or_else(|| Error::not_found("config", format!("of plan {}", plan_id)))
}

/// Per-step audit trail of a plan
pub async fn list_tasks(store: &dyn PlanStore, plan_id: i64) -> Result<Vec<Task>> {
    ensure_plan(store, plan_id).await?;
    Ok(store.list_tasks(plan_id).await?)
}

async fn ensure_plan(store: &dyn PlanStore, plan_id: i64) -> Result<Plan> {
    store
        .get_plan(plan_id)
        .await?
        .ok_or_else(|| Error::not_found("plan", plan_id))
}

// =============================================================================
// Validation
// =============================================================================

fn validate_name(kind: &str, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation(format!("{} name cannot be empty", kind)));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "{} name cannot exceed {} characters",
            kind, MAX_NAME_LEN
        )));
    }
    Ok(())
}

fn validate_config(req: &CreateConfig) -> Result<()> {
    validate_name("config", &req.name)?;

    if req.kubernetes.kubernetes_version.trim().is_empty() {
        return Err(Error::Validation(
            "kubernetes version cannot be empty".to_string(),
        ));
    }

    let has_vip = req
        .kubernetes
        .api_server
        .as_deref()
        .is_some_and(|vip| !vip.trim().is_empty());
    if req.kubernetes.enable_ha && !has_vip {
        return Err(Error::Validation(
            "high availability requires an api server address".to_string(),
        ));
    }

    if req.network.network_interface.trim().is_empty() {
        return Err(Error::Validation(
            "network interface cannot be empty".to_string(),
        ));
    }

    validate_cidr("pod network", &req.network.pod_network)?;
    validate_cidr("service subnet", &req.network.service_subnet)?;

    Ok(())
}

fn validate_cidr(field: &str, cidr: &str) -> Result<()> {
    let valid = cidr.split_once('/').is_some_and(|(addr, prefix)| {
        addr.parse::<IpAddr>().is_ok() && prefix.parse::<u8>().is_ok_and(|p| p <= 128)
    });

    if !valid {
        return Err(Error::Validation(format!(
            "{} '{}' is not a CIDR",
            field, cidr
        )));
    }
    Ok(())
}

fn validate_node(req: &CreateNode) -> Result<()> {
    validate_name("node", &req.name)?;
    let name = req.name.trim();
    validate_node_name(name)?;

    // Names and users are bare tokens on an inventory host line
    if name.contains(char::is_whitespace) {
        return Err(Error::Validation(format!(
            "node name '{}' cannot contain whitespace",
            name
        )));
    }

    if req.ip.parse::<IpAddr>().is_err() {
        return Err(Error::Validation(format!(
            "node '{}' has an invalid ip '{}'",
            req.name, req.ip
        )));
    }

    match &req.auth {
        NodeAuth::Password { user, password } => {
            if user.trim().is_empty() || password.is_empty() {
                return Err(Error::Validation(
                    "password auth requires a user and a password".to_string(),
                ));
            }
            if user.contains(char::is_whitespace) {
                return Err(Error::Validation(
                    "password auth user cannot contain whitespace".to_string(),
                ));
            }
            if password.contains(['\n', '\r']) {
                return Err(Error::Validation(
                    "password cannot contain line breaks".to_string(),
                ));
            }
        }
        NodeAuth::Key { data, .. } => {
            if data.trim().is_empty() {
                return Err(Error::Validation("key auth requires key data".to_string()));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStore;
    use keel_core::domain::config::{KubernetesSpec, NetworkSpec, RuntimeSpec};
    use keel_core::domain::node::{Cri, NodeRole};
    use keel_core::domain::task::{NewTask, TaskStatus, TaskStep};

    fn create_config_req() -> CreateConfig {
        let (kubernetes, network, runtime): (KubernetesSpec, NetworkSpec, RuntimeSpec) =
            crate::pipeline::testing::specs(false);
        CreateConfig {
            name: "default".to_string(),
            region: Some("eu-west".to_string()),
            kubernetes,
            network,
            runtime,
            description: None,
        }
    }

    fn create_node_req(name: &str, ip: &str) -> CreateNode {
        CreateNode {
            name: name.to_string(),
            role: NodeRole::Master,
            ip: ip.to_string(),
            cri: Cri::Containerd,
            auth: NodeAuth::Password {
                user: "root".to_string(),
                password: "secret".to_string(),
            },
        }
    }

    async fn plan(store: &MemoryStore) -> Plan {
        create_plan(
            store,
            CreatePlan {
                name: "cluster-1".to_string(),
                description: None,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_plan_rejects_blank_name() {
        let store = MemoryStore::new();
        let err = create_plan(
            &store,
            CreatePlan {
                name: "  ".to_string(),
                description: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_config_round_trips_specs() {
        let store = MemoryStore::new();
        let plan = plan(&store).await;

        create_config(&store, plan.id, create_config_req())
            .await
            .unwrap();

        let config = get_config(&store, plan.id).await.unwrap();
        let network = NetworkSpec::unmarshal(&config.network).unwrap();
        assert_eq!(network, create_config_req().network);
        assert_eq!(config.region.as_deref(), Some("eu-west"));
    }

    #[tokio::test]
    async fn test_config_requires_plan_and_valid_cidrs() {
        let store = MemoryStore::new();
        let err = create_config(&store, 99, create_config_req())
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let plan = plan(&store).await;
        let mut req = create_config_req();
        req.network.pod_network = "172.30.0.0".to_string();
        assert!(create_config(&store, plan.id, req).await.is_err());
    }

    #[tokio::test]
    async fn test_create_node_validates() {
        let store = MemoryStore::new();
        let plan = plan(&store).await;

        let node = create_node(&store, plan.id, create_node_req("m1", "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(
            NodeAuth::unmarshal(&node.auth).unwrap(),
            create_node_req("m1", "10.0.0.1").auth
        );

        for req in [
            create_node_req("m1", "10.0.0.2"),
            create_node_req("m2", "not-an-ip"),
            create_node_req("../m3", "10.0.0.3"),
        ] {
            assert!(create_node(&store, plan.id, req).await.is_err());
        }

        assert_eq!(list_nodes(&store, plan.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_node_stores_trimmed_name() {
        let store = MemoryStore::new();
        let plan = plan(&store).await;

        let node = create_node(&store, plan.id, create_node_req(" m1 ", "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(node.name, "m1");
        assert_eq!(list_nodes(&store, plan.id).await.unwrap()[0].name, "m1");

        let err = create_node(&store, plan.id, create_node_req("m1", "10.0.0.2"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_node_rejects_inventory_breaking_values() {
        let store = MemoryStore::new();
        let plan = plan(&store).await;

        let password = |user: &str, password: &str| {
            let mut req = create_node_req("m1", "10.0.0.1");
            req.auth = NodeAuth::Password {
                user: user.to_string(),
                password: password.to_string(),
            };
            req
        };

        for req in [
            create_node_req("m 1", "10.0.0.1"),
            password("ro ot", "secret"),
            password("root", "sec\nret"),
            password("root", "sec\rret"),
        ] {
            let err = create_node(&store, plan.id, req).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }

        // Spaces, quotes and hashes are quoted in the inventory
        create_node(&store, plan.id, password("root", "p w#\"x"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_start_plan_enqueues() {
        let store = MemoryStore::new();
        let queue = WorkQueue::new();
        let plan = plan(&store).await;

        start_plan(&store, &queue, plan.id).await.unwrap();
        assert_eq!(queue.len(), 1);

        let err = start_plan(&store, &queue, plan.id + 1).await.unwrap_err();
        assert!(err.is_not_found());

        queue.shut_down();
        assert!(start_plan(&store, &queue, plan.id).await.is_err());
    }

    #[tokio::test]
    async fn test_list_tasks() {
        let store = MemoryStore::new();
        let plan = plan(&store).await;
        store
            .create_task(NewTask {
                plan_id: plan.id,
                name: "Check".to_string(),
                step: TaskStep::Running,
                status: TaskStatus::Success,
                message: String::new(),
            })
            .await
            .unwrap();

        let tasks = list_tasks(&store, plan.id).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "Check");
        assert!(list_tasks(&store, plan.id + 1).await.is_err());
    }
}
