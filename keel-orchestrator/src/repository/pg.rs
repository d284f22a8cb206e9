//! Postgres storage backend
//!
//! Thin adapter from [`PlanStore`] onto the per-entity query modules.

use async_trait::async_trait;
use keel_core::domain::cluster::Cluster;
use keel_core::domain::config::{Config, ConfigUpdate, NewConfig};
use keel_core::domain::node::{NewNode, Node, NodeUpdate};
use keel_core::domain::plan::{Plan, PlanUpdate};
use keel_core::domain::task::{NewTask, Task, TaskUpdate};
use sqlx::PgPool;

use super::{
    ClusterRegistry, PlanStore, Result, StoreError, cluster as cluster_repository,
    config as config_repository, node as node_repository, plan as plan_repository,
    task as task_repository,
};

/// Postgres storage backend
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Explains why a versioned update touched no row
///
/// `table` is always one of the fixed table names of this module.
pub(crate) async fn update_miss(
    pool: &PgPool,
    table: &'static str,
    kind: &'static str,
    id: i64,
    expected: i64,
) -> StoreError {
    let query = format!("SELECT resource_version FROM {} WHERE id = $1", table);

    match sqlx::query_scalar::<_, i64>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
    {
        Ok(Some(_)) => StoreError::Conflict { kind, id, expected },
        Ok(None) => StoreError::not_found(kind, id),
        Err(e) => e.into(),
    }
}

#[async_trait]
impl PlanStore for PgStore {
    // === Plan Operations ===

    async fn create_plan(&self, name: &str, description: Option<&str>) -> Result<Plan> {
        plan_repository::create(&self.pool, name, description).await
    }

    async fn get_plan(&self, id: i64) -> Result<Option<Plan>> {
        plan_repository::find_by_id(&self.pool, id).await
    }

    async fn list_plans(&self) -> Result<Vec<Plan>> {
        plan_repository::list_all(&self.pool).await
    }

    async fn update_plan(
        &self,
        id: i64,
        resource_version: i64,
        update: PlanUpdate,
    ) -> Result<Plan> {
        plan_repository::update(&self.pool, id, resource_version, update).await
    }

    async fn delete_plan(&self, id: i64) -> Result<bool> {
        plan_repository::delete(&self.pool, id).await
    }

    // === Node Operations ===

    async fn create_node(&self, node: NewNode) -> Result<Node> {
        node_repository::create(&self.pool, node).await
    }

    async fn get_node(&self, id: i64) -> Result<Option<Node>> {
        node_repository::find_by_id(&self.pool, id).await
    }

    async fn list_nodes(&self, plan_id: i64) -> Result<Vec<Node>> {
        node_repository::find_by_plan(&self.pool, plan_id).await
    }

    async fn update_node(
        &self,
        id: i64,
        resource_version: i64,
        update: NodeUpdate,
    ) -> Result<Node> {
        node_repository::update(&self.pool, id, resource_version, update).await
    }

    async fn delete_node(&self, id: i64) -> Result<bool> {
        node_repository::delete(&self.pool, id).await
    }

    // === Config Operations ===

    async fn create_config(&self, config: NewConfig) -> Result<Config> {
        config_repository::create(&self.pool, config).await
    }

    async fn get_config(&self, plan_id: i64) -> Result<Option<Config>> {
        config_repository::find_by_plan(&self.pool, plan_id).await
    }

    async fn update_config(
        &self,
        id: i64,
        resource_version: i64,
        update: ConfigUpdate,
    ) -> Result<Config> {
        config_repository::update(&self.pool, id, resource_version, update).await
    }

    async fn delete_config(&self, id: i64) -> Result<bool> {
        config_repository::delete(&self.pool, id).await
    }

    // === Task Operations ===

    async fn create_task(&self, task: NewTask) -> Result<Task> {
        task_repository::create(&self.pool, task).await
    }

    async fn get_task(&self, plan_id: i64, name: &str) -> Result<Option<Task>> {
        task_repository::find_by_name(&self.pool, plan_id, name).await
    }

    async fn list_tasks(&self, plan_id: i64) -> Result<Vec<Task>> {
        task_repository::find_by_plan(&self.pool, plan_id).await
    }

    async fn update_task(
        &self,
        id: i64,
        resource_version: i64,
        update: TaskUpdate,
    ) -> Result<Task> {
        task_repository::update(&self.pool, id, resource_version, update).await
    }

    async fn delete_task(&self, id: i64) -> Result<bool> {
        task_repository::delete(&self.pool, id).await
    }
}

#[async_trait]
impl ClusterRegistry for PgStore {
    async fn register_cluster(&self, plan_id: i64, kube_config: &str) -> Result<Cluster> {
        cluster_repository::upsert(&self.pool, plan_id, kube_config).await
    }

    async fn get_cluster(&self, plan_id: i64) -> Result<Option<Cluster>> {
        cluster_repository::find_by_plan(&self.pool, plan_id).await
    }
}
