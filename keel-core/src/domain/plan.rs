//! Plan domain types

use serde::{Deserialize, Serialize};

/// Deployment plan
///
/// Root aggregate: a request to turn a set of bare-metal nodes into a
/// running Kubernetes cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub resource_version: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Partial update of a plan. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}
