//! Plan DTOs

use serde::{Deserialize, Serialize};

/// Request to create a new plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlan {
    pub name: String,
    pub description: Option<String>,
}
