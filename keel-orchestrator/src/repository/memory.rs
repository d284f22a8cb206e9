//! In-memory storage backend
//!
//! Simple storage for testing and development. Enforces the same
//! constraints as the Postgres schema: unique plan names, one config per
//! plan, unique `(plan_id, name)` tasks, and nodes/configs referencing a
//! live plan.

use async_trait::async_trait;
use keel_core::domain::cluster::Cluster;
use keel_core::domain::config::{Config, ConfigUpdate, NewConfig};
use keel_core::domain::node::{NewNode, Node, NodeUpdate};
use keel_core::domain::plan::{Plan, PlanUpdate};
use keel_core::domain::task::{NewTask, Task, TaskUpdate};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{ClusterRegistry, PlanStore, Result, StoreError};

/// In-memory storage backend
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    plans: BTreeMap<i64, Plan>,
    nodes: BTreeMap<i64, Node>,
    configs: BTreeMap<i64, Config>,
    tasks: BTreeMap<i64, Task>,
    clusters: BTreeMap<i64, Cluster>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn require_plan(&self, plan_id: i64) -> Result<()> {
        if self.plans.contains_key(&plan_id) {
            Ok(())
        } else {
            Err(StoreError::not_found("plan", plan_id))
        }
    }
}

/// Applies the versioned-update rule shared by every entity
fn check_version(kind: &'static str, id: i64, current: i64, expected: i64) -> Result<()> {
    if current == expected {
        Ok(())
    } else {
        Err(StoreError::Conflict { kind, id, expected })
    }
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|e| StoreError::Database(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|e| StoreError::Database(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlanStore for MemoryStore {
    // === Plan Operations ===

    async fn create_plan(&self, name: &str, description: Option<&str>) -> Result<Plan> {
        let mut tables = self.write()?;

        if tables.plans.values().any(|p| p.name == name) {
            return Err(StoreError::AlreadyExists(format!("plan '{}'", name)));
        }

        let now = chrono::Utc::now();
        let plan = Plan {
            id: tables.next_id(),
            name: name.to_string(),
            description: description.map(str::to_string),
            resource_version: 1,
            created_at: now,
            updated_at: now,
        };
        tables.plans.insert(plan.id, plan.clone());
        Ok(plan)
    }

    async fn get_plan(&self, id: i64) -> Result<Option<Plan>> {
        Ok(self.read()?.plans.get(&id).cloned())
    }

    async fn list_plans(&self) -> Result<Vec<Plan>> {
        Ok(self.read()?.plans.values().cloned().collect())
    }

    async fn update_plan(
        &self,
        id: i64,
        resource_version: i64,
        update: PlanUpdate,
    ) -> Result<Plan> {
        let mut tables = self.write()?;

        if let Some(name) = &update.name {
            if tables.plans.values().any(|p| p.id != id && &p.name == name) {
                return Err(StoreError::AlreadyExists(format!("plan '{}'", name)));
            }
        }

        let plan = tables
            .plans
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("plan", id))?;
        check_version("plan", id, plan.resource_version, resource_version)?;

        if let Some(name) = update.name {
            plan.name = name;
        }
        if let Some(description) = update.description {
            plan.description = Some(description);
        }
        plan.resource_version += 1;
        plan.updated_at = chrono::Utc::now();
        Ok(plan.clone())
    }

    async fn delete_plan(&self, id: i64) -> Result<bool> {
        let mut tables = self.write()?;

        let existed = tables.plans.remove(&id).is_some();
        if existed {
            tables.nodes.retain(|_, n| n.plan_id != id);
            tables.configs.retain(|_, c| c.plan_id != id);
            tables.tasks.retain(|_, t| t.plan_id != id);
            tables.clusters.retain(|_, c| c.plan_id != id);
        }
        Ok(existed)
    }

    // === Node Operations ===

    async fn create_node(&self, req: NewNode) -> Result<Node> {
        let mut tables = self.write()?;
        tables.require_plan(req.plan_id)?;

        let now = chrono::Utc::now();
        let node = Node {
            id: tables.next_id(),
            name: req.name,
            plan_id: req.plan_id,
            role: req.role,
            ip: req.ip,
            cri: req.cri,
            auth: req.auth,
            resource_version: 1,
            created_at: now,
            updated_at: now,
        };
        tables.nodes.insert(node.id, node.clone());
        Ok(node)
    }

    async fn get_node(&self, id: i64) -> Result<Option<Node>> {
        Ok(self.read()?.nodes.get(&id).cloned())
    }

    async fn list_nodes(&self, plan_id: i64) -> Result<Vec<Node>> {
        Ok(self
            .read()?
            .nodes
            .values()
            .filter(|n| n.plan_id == plan_id)
            .cloned()
            .collect())
    }

    async fn update_node(
        &self,
        id: i64,
        resource_version: i64,
        update: NodeUpdate,
    ) -> Result<Node> {
        let mut tables = self.write()?;

        let node = tables
            .nodes
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("node", id))?;
        check_version("node", id, node.resource_version, resource_version)?;

        if let Some(name) = update.name {
            node.name = name;
        }
        if let Some(role) = update.role {
            node.role = role;
        }
        if let Some(ip) = update.ip {
            node.ip = ip;
        }
        if let Some(cri) = update.cri {
            node.cri = cri;
        }
        if let Some(auth) = update.auth {
            node.auth = auth;
        }
        node.resource_version += 1;
        node.updated_at = chrono::Utc::now();
        Ok(node.clone())
    }

    async fn delete_node(&self, id: i64) -> Result<bool> {
        Ok(self.write()?.nodes.remove(&id).is_some())
    }

    // === Config Operations ===

    async fn create_config(&self, req: NewConfig) -> Result<Config> {
        let mut tables = self.write()?;
        tables.require_plan(req.plan_id)?;

        if tables.configs.values().any(|c| c.plan_id == req.plan_id) {
            return Err(StoreError::AlreadyExists(format!(
                "config for plan {}",
                req.plan_id
            )));
        }

        let now = chrono::Utc::now();
        let config = Config {
            id: tables.next_id(),
            plan_id: req.plan_id,
            name: req.name,
            region: req.region,
            kubernetes: req.kubernetes,
            network: req.network,
            runtime: req.runtime,
            description: req.description,
            resource_version: 1,
            created_at: now,
            updated_at: now,
        };
        tables.configs.insert(config.id, config.clone());
        Ok(config)
    }

    async fn get_config(&self, plan_id: i64) -> Result<Option<Config>> {
        Ok(self
            .read()?
            .configs
            .values()
            .find(|c| c.plan_id == plan_id)
            .cloned())
    }

    async fn update_config(
        &self,
        id: i64,
        resource_version: i64,
        update: ConfigUpdate,
    ) -> Result<Config> {
        let mut tables = self.write()?;

        let config = tables
            .configs
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("config", id))?;
        check_version("config", id, config.resource_version, resource_version)?;

        if let Some(name) = update.name {
            config.name = name;
        }
        if let Some(region) = update.region {
            config.region = Some(region);
        }
        if let Some(kubernetes) = update.kubernetes {
            config.kubernetes = kubernetes;
        }
        if let Some(network) = update.network {
            config.network = network;
        }
        if let Some(runtime) = update.runtime {
            config.runtime = runtime;
        }
        if let Some(description) = update.description {
            config.description = Some(description);
        }
        config.resource_version += 1;
        config.updated_at = chrono::Utc::now();
        Ok(config.clone())
    }

    async fn delete_config(&self, id: i64) -> Result<bool> {
        Ok(self.write()?.configs.remove(&id).is_some())
    }

    // === Task Operations ===

    async fn create_task(&self, req: NewTask) -> Result<Task> {
        let mut tables = self.write()?;
        tables.require_plan(req.plan_id)?;

        if tables
            .tasks
            .values()
            .any(|t| t.plan_id == req.plan_id && t.name == req.name)
        {
            return Err(StoreError::AlreadyExists(format!(
                "task {} for plan {}",
                req.name, req.plan_id
            )));
        }

        let now = chrono::Utc::now();
        let task = Task {
            id: tables.next_id(),
            plan_id: req.plan_id,
            name: req.name,
            step: req.step,
            status: req.status,
            message: req.message,
            resource_version: 1,
            created_at: now,
            updated_at: now,
        };
        tables.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, plan_id: i64, name: &str) -> Result<Option<Task>> {
        Ok(self
            .read()?
            .tasks
            .values()
            .find(|t| t.plan_id == plan_id && t.name == name)
            .cloned())
    }

    async fn list_tasks(&self, plan_id: i64) -> Result<Vec<Task>> {
        Ok(self
            .read()?
            .tasks
            .values()
            .filter(|t| t.plan_id == plan_id)
            .cloned()
            .collect())
    }

    async fn update_task(
        &self,
        id: i64,
        resource_version: i64,
        update: TaskUpdate,
    ) -> Result<Task> {
        let mut tables = self.write()?;

        let task = tables
            .tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("task", id))?;
        check_version("task", id, task.resource_version, resource_version)?;

        if let Some(step) = update.step {
            task.step = step;
        }
        if let Some(status) = update.status {
            task.status = status;
        }
        if let Some(message) = update.message {
            task.message = message;
        }
        task.resource_version += 1;
        task.updated_at = chrono::Utc::now();
        Ok(task.clone())
    }

    async fn delete_task(&self, id: i64) -> Result<bool> {
        Ok(self.write()?.tasks.remove(&id).is_some())
    }
}

#[async_trait]
impl ClusterRegistry for MemoryStore {
    async fn register_cluster(&self, plan_id: i64, kube_config: &str) -> Result<Cluster> {
        let mut tables = self.write()?;
        tables.require_plan(plan_id)?;

        if let Some(cluster) = tables.clusters.values_mut().find(|c| c.plan_id == plan_id) {
            cluster.kube_config = kube_config.to_string();
            return Ok(cluster.clone());
        }

        let cluster = Cluster {
            id: tables.next_id(),
            plan_id,
            kube_config: kube_config.to_string(),
            created_at: chrono::Utc::now(),
        };
        tables.clusters.insert(cluster.id, cluster.clone());
        Ok(cluster)
    }

    async fn get_cluster(&self, plan_id: i64) -> Result<Option<Cluster>> {
        Ok(self
            .read()?
            .clusters
            .values()
            .find(|c| c.plan_id == plan_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::domain::node::{Cri, NodeRole};
    use keel_core::domain::task::{TaskStatus, TaskStep};

    fn new_task(plan_id: i64, name: &str) -> NewTask {
        NewTask {
            plan_id,
            name: name.to_string(),
            step: TaskStep::Running,
            status: TaskStatus::Pending,
            message: String::new(),
        }
    }

    #[tokio::test]
    async fn test_update_with_current_version_bumps_it() {
        let store = MemoryStore::new();
        let plan = store.create_plan("prod", None).await.unwrap();
        let task = store.create_task(new_task(plan.id, "Check")).await.unwrap();
        assert_eq!(task.resource_version, 1);

        let updated = store
            .update_task(
                task.id,
                task.resource_version,
                TaskUpdate {
                    status: Some(TaskStatus::Success),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.resource_version, 2);
        assert_eq!(updated.status, TaskStatus::Success);
        assert_eq!(updated.step, TaskStep::Running);
    }

    #[tokio::test]
    async fn test_update_with_stale_version_leaves_row_unchanged() {
        let store = MemoryStore::new();
        let plan = store.create_plan("prod", None).await.unwrap();
        let task = store.create_task(new_task(plan.id, "Check")).await.unwrap();

        let err = store
            .update_task(
                task.id,
                task.resource_version + 1,
                TaskUpdate {
                    status: Some(TaskStatus::Failed),
                    message: Some("boom".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { kind: "task", .. }));

        let stored = store.get_task(plan.id, "Check").await.unwrap().unwrap();
        assert_eq!(stored, task);
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_plan(42, 1, PlanUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "plan", .. }));
    }

    #[tokio::test]
    async fn test_task_is_unique_per_plan_and_name() {
        let store = MemoryStore::new();
        let plan = store.create_plan("prod", None).await.unwrap();
        store.create_task(new_task(plan.id, "Render")).await.unwrap();

        let err = store
            .create_task(new_task(plan.id, "Render"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(store.list_tasks(plan.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_children_require_live_plan() {
        let store = MemoryStore::new();
        let err = store
            .create_node(NewNode {
                plan_id: 9,
                name: "master-1".to_string(),
                role: NodeRole::Master,
                ip: "10.0.0.1".to_string(),
                cri: Cri::Docker,
                auth: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "plan", .. }));
    }

    #[tokio::test]
    async fn test_plan_names_are_unique() {
        let store = MemoryStore::new();
        store.create_plan("prod", None).await.unwrap();
        let err = store.create_plan("prod", Some("again")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_register_cluster_replaces_kubeconfig() {
        let store = MemoryStore::new();
        let plan = store.create_plan("prod", None).await.unwrap();

        let first = store.register_cluster(plan.id, "Zmlyc3Q=").await.unwrap();
        let second = store.register_cluster(plan.id, "c2Vjb25k").await.unwrap();

        assert_eq!(first.id, second.id);
        let stored = store.get_cluster(plan.id).await.unwrap().unwrap();
        assert_eq!(stored.kube_config, "c2Vjb25k");
    }
}
