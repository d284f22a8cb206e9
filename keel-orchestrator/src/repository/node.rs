//! Node Repository
//!
//! Handles all database operations related to nodes.

use keel_core::domain::node::{NewNode, Node, NodeUpdate};
use sqlx::PgPool;

use super::{Result, StoreError, pg};

/// Create a new node in the database
pub async fn create(pool: &PgPool, req: NewNode) -> Result<Node> {
    let now = chrono::Utc::now();

    let row = sqlx::query_as::<_, NodeRow>(
        r#"
        INSERT INTO nodes (plan_id, name, role, ip, cri, auth, resource_version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, 1, $7, $7)
        RETURNING id, plan_id, name, role, ip, cri, auth, resource_version, created_at, updated_at
        "#,
    )
    .bind(req.plan_id)
    .bind(&req.name)
    .bind(req.role.as_str())
    .bind(&req.ip)
    .bind(req.cri.as_str())
    .bind(&req.auth)
    .bind(now)
    .fetch_one(pool)
    .await?;

    row.try_into()
}

/// Find a node by ID
pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Node>> {
    let row = sqlx::query_as::<_, NodeRow>(
        r#"
        SELECT id, plan_id, name, role, ip, cri, auth, resource_version, created_at, updated_at
        FROM nodes
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(Node::try_from).transpose()
}

/// Find nodes by plan ID, in creation order
pub async fn find_by_plan(pool: &PgPool, plan_id: i64) -> Result<Vec<Node>> {
    let rows = sqlx::query_as::<_, NodeRow>(
        r#"
        SELECT id, plan_id, name, role, ip, cri, auth, resource_version, created_at, updated_at
        FROM nodes
        WHERE plan_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Node::try_from).collect()
}

/// Update a node if `resource_version` is still current
pub async fn update(
    pool: &PgPool,
    id: i64,
    resource_version: i64,
    update: NodeUpdate,
) -> Result<Node> {
    let now = chrono::Utc::now();

    let row = sqlx::query_as::<_, NodeRow>(
        r#"
        UPDATE nodes
        SET name = COALESCE($1, name),
            role = COALESCE($2, role),
            ip = COALESCE($3, ip),
            cri = COALESCE($4, cri),
            auth = COALESCE($5, auth),
            resource_version = resource_version + 1,
            updated_at = $6
        WHERE id = $7 AND resource_version = $8
        RETURNING id, plan_id, name, role, ip, cri, auth, resource_version, created_at, updated_at
        "#,
    )
    .bind(update.name)
    .bind(update.role.map(|r| r.as_str()))
    .bind(update.ip)
    .bind(update.cri.map(|c| c.as_str()))
    .bind(update.auth)
    .bind(now)
    .bind(id)
    .bind(resource_version)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => row.try_into(),
        None => Err(pg::update_miss(pool, "nodes", "node", id, resource_version).await),
    }
}

/// Delete a node by ID
pub async fn delete(pool: &PgPool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM nodes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct NodeRow {
    id: i64,
    plan_id: i64,
    name: String,
    role: String,
    ip: String,
    cri: String,
    auth: String,
    resource_version: i64,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<NodeRow> for Node {
    type Error = StoreError;

    fn try_from(row: NodeRow) -> Result<Self> {
        Ok(Node {
            id: row.id,
            plan_id: row.plan_id,
            name: row.name,
            role: row.role.parse().map_err(StoreError::InvalidData)?,
            ip: row.ip,
            cri: row.cri.parse().map_err(StoreError::InvalidData)?,
            auth: row.auth,
            resource_version: row.resource_version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
