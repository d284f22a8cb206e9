//! Plan Repository
//!
//! Handles all database operations related to plans.

use keel_core::domain::plan::{Plan, PlanUpdate};
use sqlx::PgPool;

use super::{Result, pg};

/// Create a new plan in the database
pub async fn create(pool: &PgPool, name: &str, description: Option<&str>) -> Result<Plan> {
    let now = chrono::Utc::now();

    let row = sqlx::query_as::<_, PlanRow>(
        r#"
        INSERT INTO plans (name, description, resource_version, created_at, updated_at)
        VALUES ($1, $2, 1, $3, $3)
        RETURNING id, name, description, resource_version, created_at, updated_at
        "#,
    )
    .bind(name)
    .bind(description)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// Find a plan by ID
pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Plan>> {
    let row = sqlx::query_as::<_, PlanRow>(
        r#"
        SELECT id, name, description, resource_version, created_at, updated_at
        FROM plans
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List all plans
pub async fn list_all(pool: &PgPool) -> Result<Vec<Plan>> {
    let rows = sqlx::query_as::<_, PlanRow>(
        r#"
        SELECT id, name, description, resource_version, created_at, updated_at
        FROM plans
        ORDER BY id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Update a plan if `resource_version` is still current
pub async fn update(
    pool: &PgPool,
    id: i64,
    resource_version: i64,
    update: PlanUpdate,
) -> Result<Plan> {
    let now = chrono::Utc::now();

    let row = sqlx::query_as::<_, PlanRow>(
        r#"
        UPDATE plans
        SET name = COALESCE($1, name),
            description = COALESCE($2, description),
            resource_version = resource_version + 1,
            updated_at = $3
        WHERE id = $4 AND resource_version = $5
        RETURNING id, name, description, resource_version, created_at, updated_at
        "#,
    )
    .bind(update.name)
    .bind(update.description)
    .bind(now)
    .bind(id)
    .bind(resource_version)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(row.into()),
        None => Err(pg::update_miss(pool, "plans", "plan", id, resource_version).await),
    }
}

/// Delete a plan by ID
pub async fn delete(pool: &PgPool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM plans WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PlanRow {
    id: i64,
    name: String,
    description: Option<String>,
    resource_version: i64,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<PlanRow> for Plan {
    fn from(row: PlanRow) -> Self {
        Plan {
            id: row.id,
            name: row.name,
            description: row.description,
            resource_version: row.resource_version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
