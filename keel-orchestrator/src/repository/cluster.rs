//! Cluster Repository
//!
//! Handles database operations for registered clusters.

use keel_core::domain::cluster::Cluster;
use sqlx::PgPool;

use super::Result;

/// Create the cluster of a plan, replacing the kubeconfig of an existing one
pub async fn upsert(pool: &PgPool, plan_id: i64, kube_config: &str) -> Result<Cluster> {
    let now = chrono::Utc::now();

    let row = sqlx::query_as::<_, ClusterRow>(
        r#"
        INSERT INTO clusters (plan_id, kube_config, created_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (plan_id) DO UPDATE SET kube_config = EXCLUDED.kube_config
        RETURNING id, plan_id, kube_config, created_at
        "#,
    )
    .bind(plan_id)
    .bind(kube_config)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// Find the cluster of a plan
pub async fn find_by_plan(pool: &PgPool, plan_id: i64) -> Result<Option<Cluster>> {
    let row = sqlx::query_as::<_, ClusterRow>(
        r#"
        SELECT id, plan_id, kube_config, created_at
        FROM clusters
        WHERE plan_id = $1
        "#,
    )
    .bind(plan_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

#[derive(sqlx::FromRow)]
struct ClusterRow {
    id: i64,
    plan_id: i64,
    kube_config: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ClusterRow> for Cluster {
    fn from(row: ClusterRow) -> Self {
        Cluster {
            id: row.id,
            plan_id: row.plan_id,
            kube_config: row.kube_config,
            created_at: row.created_at,
        }
    }
}
