//! Repository Module
//!
//! Data access layer for the orchestrator.
//!
//! [`PlanStore`] is the persistence contract for plans, nodes, configs and
//! tasks. Every `update_*` takes the caller's expected resource version and
//! only applies if it still matches; a successful update bumps the version by
//! exactly one. Two backends implement it:
//! - [`PgStore`] - Postgres, one module of queries per entity
//! - [`MemoryStore`] - in-memory storage for tests and development

pub mod cluster;
pub mod config;
pub mod memory;
pub mod node;
pub mod pg;
pub mod plan;
pub mod task;

pub use memory::MemoryStore;
pub use pg::PgStore;

use async_trait::async_trait;
use keel_core::domain::cluster::Cluster;
use keel_core::domain::config::{Config, ConfigUpdate, NewConfig};
use keel_core::domain::node::{NewNode, Node, NodeUpdate};
use keel_core::domain::plan::{Plan, PlanUpdate};
use keel_core::domain::task::{NewTask, Task, TaskUpdate};
use thiserror::Error;

/// Errors from storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Expected resource version did not match the stored one
    #[error("{kind} {id}: resource version {expected} is stale")]
    Conflict {
        kind: &'static str,
        id: i64,
        expected: i64,
    },

    #[error("database error: {0}")]
    Database(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::AlreadyExists(db.message().to_string());
            }
            if db.is_foreign_key_violation() {
                return StoreError::NotFound {
                    kind: "plan",
                    id: db.message().to_string(),
                };
            }
        }
        StoreError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistence for plans and everything hanging off them
///
/// The trait is object-safe and is shared as `Arc<dyn PlanStore>`.
#[async_trait]
pub trait PlanStore: Send + Sync {
    // === Plan Operations ===

    async fn create_plan(&self, name: &str, description: Option<&str>) -> Result<Plan>;

    async fn get_plan(&self, id: i64) -> Result<Option<Plan>>;

    async fn list_plans(&self) -> Result<Vec<Plan>>;

    async fn update_plan(&self, id: i64, resource_version: i64, update: PlanUpdate)
    -> Result<Plan>;

    /// Returns whether the plan existed
    async fn delete_plan(&self, id: i64) -> Result<bool>;

    // === Node Operations ===

    /// Fails with `NotFound` if the plan does not exist
    async fn create_node(&self, node: NewNode) -> Result<Node>;

    async fn get_node(&self, id: i64) -> Result<Option<Node>>;

    /// Nodes of a plan in creation order
    async fn list_nodes(&self, plan_id: i64) -> Result<Vec<Node>>;

    async fn update_node(&self, id: i64, resource_version: i64, update: NodeUpdate)
    -> Result<Node>;

    async fn delete_node(&self, id: i64) -> Result<bool>;

    // === Config Operations ===

    /// Fails with `NotFound` if the plan does not exist and with
    /// `AlreadyExists` if the plan already has a config
    async fn create_config(&self, config: NewConfig) -> Result<Config>;

    async fn get_config(&self, plan_id: i64) -> Result<Option<Config>>;

    async fn update_config(
        &self,
        id: i64,
        resource_version: i64,
        update: ConfigUpdate,
    ) -> Result<Config>;

    async fn delete_config(&self, id: i64) -> Result<bool>;

    // === Task Operations ===

    /// Fails with `AlreadyExists` if `(plan_id, name)` is taken
    async fn create_task(&self, task: NewTask) -> Result<Task>;

    async fn get_task(&self, plan_id: i64, name: &str) -> Result<Option<Task>>;

    /// Tasks of a plan in creation order
    async fn list_tasks(&self, plan_id: i64) -> Result<Vec<Task>>;

    async fn update_task(&self, id: i64, resource_version: i64, update: TaskUpdate)
    -> Result<Task>;

    async fn delete_task(&self, id: i64) -> Result<bool>;
}

/// Destination of cluster registration
///
/// The registrar hands over the encoded kubeconfig; what a cluster becomes
/// beyond that is owned by the registry.
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    /// Creates or replaces the cluster of a plan
    async fn register_cluster(&self, plan_id: i64, kube_config: &str) -> Result<Cluster>;

    async fn get_cluster(&self, plan_id: i64) -> Result<Option<Cluster>>;
}
