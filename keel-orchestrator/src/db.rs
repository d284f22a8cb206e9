use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create plans table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS plans (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            description TEXT,
            resource_version BIGINT NOT NULL DEFAULT 1,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create nodes table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS nodes (
            id BIGSERIAL PRIMARY KEY,
            plan_id BIGINT NOT NULL REFERENCES plans(id) ON DELETE CASCADE,
            name VARCHAR(255) NOT NULL,
            role VARCHAR(20) NOT NULL,
            ip VARCHAR(64) NOT NULL,
            cri VARCHAR(20) NOT NULL,
            auth TEXT NOT NULL,
            resource_version BIGINT NOT NULL DEFAULT 1,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create configs table, one per plan
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS configs (
            id BIGSERIAL PRIMARY KEY,
            plan_id BIGINT NOT NULL UNIQUE REFERENCES plans(id) ON DELETE CASCADE,
            name VARCHAR(255) NOT NULL,
            region VARCHAR(255),
            kubernetes TEXT NOT NULL,
            network TEXT NOT NULL,
            runtime TEXT NOT NULL,
            description TEXT,
            resource_version BIGINT NOT NULL DEFAULT 1,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create tasks table, one row per (plan, handler)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id BIGSERIAL PRIMARY KEY,
            plan_id BIGINT NOT NULL REFERENCES plans(id) ON DELETE CASCADE,
            name VARCHAR(64) NOT NULL,
            step VARCHAR(20) NOT NULL,
            status VARCHAR(20) NOT NULL,
            message TEXT NOT NULL DEFAULT '',
            resource_version BIGINT NOT NULL DEFAULT 1,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            UNIQUE (plan_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create clusters table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS clusters (
            id BIGSERIAL PRIMARY KEY,
            plan_id BIGINT NOT NULL UNIQUE REFERENCES plans(id) ON DELETE CASCADE,
            kube_config TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for plan-scoped lookups
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_nodes_plan_id ON nodes(plan_id, id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_plan_id ON tasks(plan_id, id)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
