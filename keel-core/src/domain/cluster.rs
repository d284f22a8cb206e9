//! Cluster domain types

use serde::{Deserialize, Serialize};

/// A registered cluster
///
/// Written once the pipeline has retrieved an admin kubeconfig from one of
/// the plan's masters. One cluster per plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: i64,
    pub plan_id: i64,
    /// Base64 encoded admin kubeconfig
    pub kube_config: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
