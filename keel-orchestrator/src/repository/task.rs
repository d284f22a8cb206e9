//! Task Repository
//!
//! Handles all database operations related to pipeline task rows.

use keel_core::domain::task::{NewTask, Task, TaskUpdate};
use sqlx::PgPool;

use super::{Result, StoreError, pg};

/// Create a new task in the database
pub async fn create(pool: &PgPool, req: NewTask) -> Result<Task> {
    let now = chrono::Utc::now();

    let row = sqlx::query_as::<_, TaskRow>(
        r#"
        INSERT INTO tasks (plan_id, name, step, status, message, resource_version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, 1, $6, $6)
        RETURNING id, plan_id, name, step, status, message, resource_version, created_at, updated_at
        "#,
    )
    .bind(req.plan_id)
    .bind(&req.name)
    .bind(req.step.as_str())
    .bind(req.status.as_str())
    .bind(&req.message)
    .bind(now)
    .fetch_one(pool)
    .await?;

    row.try_into()
}

/// Find the task of a plan's handler
pub async fn find_by_name(pool: &PgPool, plan_id: i64, name: &str) -> Result<Option<Task>> {
    let row = sqlx::query_as::<_, TaskRow>(
        r#"
        SELECT id, plan_id, name, step, status, message, resource_version, created_at, updated_at
        FROM tasks
        WHERE plan_id = $1 AND name = $2
        "#,
    )
    .bind(plan_id)
    .bind(name)
    .fetch_optional(pool)
    .await?;

    row.map(Task::try_from).transpose()
}

/// Find tasks by plan ID, in creation order
pub async fn find_by_plan(pool: &PgPool, plan_id: i64) -> Result<Vec<Task>> {
    let rows = sqlx::query_as::<_, TaskRow>(
        r#"
        SELECT id, plan_id, name, step, status, message, resource_version, created_at, updated_at
        FROM tasks
        WHERE plan_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Task::try_from).collect()
}

/// Update a task if `resource_version` is still current
pub async fn update(
    pool: &PgPool,
    id: i64,
    resource_version: i64,
    update: TaskUpdate,
) -> Result<Task> {
    let now = chrono::Utc::now();

    let row = sqlx::query_as::<_, TaskRow>(
        r#"
        UPDATE tasks
        SET step = COALESCE($1, step),
            status = COALESCE($2, status),
            message = COALESCE($3, message),
            resource_version = resource_version + 1,
            updated_at = $4
        WHERE id = $5 AND resource_version = $6
        RETURNING id, plan_id, name, step, status, message, resource_version, created_at, updated_at
        "#,
    )
    .bind(update.step.map(|s| s.as_str()))
    .bind(update.status.map(|s| s.as_str()))
    .bind(update.message)
    .bind(now)
    .bind(id)
    .bind(resource_version)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => row.try_into(),
        None => Err(pg::update_miss(pool, "tasks", "task", id, resource_version).await),
    }
}

/// Delete a task by ID
pub async fn delete(pool: &PgPool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    plan_id: i64,
    name: String,
    step: String,
    status: String,
    message: String,
    resource_version: i64,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(Task {
            id: row.id,
            plan_id: row.plan_id,
            name: row.name,
            step: row.step.parse().map_err(StoreError::InvalidData)?,
            status: row.status.parse().map_err(StoreError::InvalidData)?,
            message: row.message,
            resource_version: row.resource_version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
