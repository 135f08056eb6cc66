//! Monitored host (agent) model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub hostname: Option<String>,
    pub platform: Option<String>,
    pub ip_address: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identification block sent with every report
#[derive(Debug, Clone, Deserialize)]
pub struct AgentInfo {
    pub agent_id: String,
    pub name: Option<String>,
    pub hostname: Option<String>,
    pub platform: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub agent_id: String,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub accepted: bool,
    pub server_time: i64,
}

impl Agent {
    /// Upsert by agent id; fields absent from the report keep their stored
    /// values, and the host flips online.
    pub async fn register_or_update(pool: &PgPool, info: &AgentInfo) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Agent>(
            r#"
            INSERT INTO agents (id, name, hostname, platform, ip_address, status)
            VALUES ($1, COALESCE($2, 'Unknown'), $3, $4, $5, 'online')
            ON CONFLICT (id) DO UPDATE SET
                name = COALESCE($2, agents.name),
                hostname = COALESCE($3, agents.hostname),
                platform = COALESCE($4, agents.platform),
                ip_address = COALESCE($5, agents.ip_address),
                status = 'online',
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&info.agent_id)
        .bind(&info.name)
        .bind(&info.hostname)
        .bind(&info.platform)
        .bind(&info.ip_address)
        .fetch_one(pool)
        .await
    }

    pub async fn update_heartbeat(
        pool: &PgPool,
        agent_id: &str,
        status: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE agents SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(agent_id)
            .bind(status)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_id(pool: &PgPool, agent_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Agent>("SELECT * FROM agents WHERE id = $1")
            .bind(agent_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Agent>("SELECT * FROM agents ORDER BY created_at ASC")
            .fetch_all(pool)
            .await
    }

    /// Delete the host and everything keyed to it. Inventory rows go via FK
    /// cascade; configs, frequency baselines and alerts are cleaned here.
    pub async fn delete(pool: &PgPool, agent_id: &str) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM baseline_configs WHERE agent_id = $1")
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM process_baselines WHERE agent_id = $1")
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM port_baselines WHERE agent_id = $1")
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM security_alerts WHERE agent_id = $1")
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM agents WHERE id = $1")
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
