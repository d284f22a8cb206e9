//! Config Repository
//!
//! Handles all database operations related to plan configs.

use keel_core::domain::config::{Config, ConfigUpdate, NewConfig};
use sqlx::PgPool;

use super::{Result, pg};

/// Create a new config in the database
pub async fn create(pool: &PgPool, req: NewConfig) -> Result<Config> {
    let now = chrono::Utc::now();

    let row = sqlx::query_as::<_, ConfigRow>(
        r#"
        INSERT INTO configs (
            plan_id, name, region, kubernetes, network, runtime, description,
            resource_version, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8, $8)
        RETURNING id, plan_id, name, region, kubernetes, network, runtime, description,
                  resource_version, created_at, updated_at
        "#,
    )
    .bind(req.plan_id)
    .bind(&req.name)
    .bind(&req.region)
    .bind(&req.kubernetes)
    .bind(&req.network)
    .bind(&req.runtime)
    .bind(&req.description)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// Find the config of a plan
pub async fn find_by_plan(pool: &PgPool, plan_id: i64) -> Result<Option<Config>> {
    let row = sqlx::query_as::<_, ConfigRow>(
        r#"
        SELECT id, plan_id, name, region, kubernetes, network, runtime, description,
               resource_version, created_at, updated_at
        FROM configs
        WHERE plan_id = $1
        "#,
    )
    .bind(plan_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Update a config if `resource_version` is still current
pub async fn update(
    pool: &PgPool,
    id: i64,
    resource_version: i64,
    update: ConfigUpdate,
) -> Result<Config> {
    let now = chrono::Utc::now();

    let row = sqlx::query_as::<_, ConfigRow>(
        r#"
        UPDATE configs
        SET name = COALESCE($1, name),
            region = COALESCE($2, region),
            kubernetes = COALESCE($3, kubernetes),
            network = COALESCE($4, network),
            runtime = COALESCE($5, runtime),
            description = COALESCE($6, description),
            resource_version = resource_version + 1,
            updated_at = $7
        WHERE id = $8 AND resource_version = $9
        RETURNING id, plan_id, name, region, kubernetes, network, runtime, description,
                  resource_version, created_at, updated_at
        "#,
    )
    .bind(update.name)
    .bind(update.region)
    .bind(update.kubernetes)
    .bind(update.network)
    .bind(update.runtime)
    .bind(update.description)
    .bind(now)
    .bind(id)
    .bind(resource_version)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(row.into()),
        None => Err(pg::update_miss(pool, "configs", "config", id, resource_version).await),
    }
}

/// Delete a config by ID
pub async fn delete(pool: &PgPool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM configs WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ConfigRow {
    id: i64,
    plan_id: i64,
    name: String,
    region: Option<String>,
    kubernetes: String,
    network: String,
    runtime: String,
    description: Option<String>,
    resource_version: i64,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<ConfigRow> for Config {
    fn from(row: ConfigRow) -> Self {
        Config {
            id: row.id,
            plan_id: row.plan_id,
            name: row.name,
            region: row.region,
            kubernetes: row.kubernetes,
            network: row.network,
            runtime: row.runtime,
            description: row.description,
            resource_version: row.resource_version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
