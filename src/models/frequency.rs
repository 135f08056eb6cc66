//! Frequency baseline rows
//!
//! One row per (agent, process name) or (agent, port, protocol). Rebuilds
//! update rows in place by key; `first_seen` survives because the upsert
//! never touches it on conflict.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::baseline::frequency::EntitySummary;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProcessBaseline {
    pub id: i64,
    pub agent_id: String,
    pub process_name: String,
    pub frequency: f64,
    pub frequency_category: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub total_appearances: i32,
    pub avg_cpu_percent: Option<f64>,
    pub avg_memory_percent: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PortBaseline {
    pub id: i64,
    pub agent_id: String,
    pub port: i32,
    pub protocol: String,
    pub frequency: f64,
    pub frequency_category: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub total_appearances: i32,
    pub updated_at: DateTime<Utc>,
}

// first_seen is only set on insert; the conflict branch must never list it.
const PROCESS_UPSERT_SQL: &str = r#"
    INSERT INTO process_baselines
        (agent_id, process_name, frequency, frequency_category,
         first_seen, last_seen, total_appearances, avg_cpu_percent, avg_memory_percent)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    ON CONFLICT (agent_id, process_name) DO UPDATE SET
        frequency = EXCLUDED.frequency,
        frequency_category = EXCLUDED.frequency_category,
        last_seen = EXCLUDED.last_seen,
        total_appearances = EXCLUDED.total_appearances,
        avg_cpu_percent = EXCLUDED.avg_cpu_percent,
        avg_memory_percent = EXCLUDED.avg_memory_percent,
        updated_at = NOW()
    RETURNING *
"#;

const PORT_UPSERT_SQL: &str = r#"
    INSERT INTO port_baselines
        (agent_id, port, protocol, frequency, frequency_category,
         first_seen, last_seen, total_appearances)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (agent_id, port, protocol) DO UPDATE SET
        frequency = EXCLUDED.frequency,
        frequency_category = EXCLUDED.frequency_category,
        last_seen = EXCLUDED.last_seen,
        total_appearances = EXCLUDED.total_appearances,
        updated_at = NOW()
    RETURNING *
"#;

impl ProcessBaseline {
    pub async fn upsert(
        pool: &PgPool,
        agent_id: &str,
        summary: &EntitySummary,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ProcessBaseline>(PROCESS_UPSERT_SQL)
        .bind(agent_id)
        .bind(&summary.entity_key)
        .bind(summary.frequency)
        .bind(summary.tier.as_str())
        .bind(summary.first_seen)
        .bind(summary.last_seen)
        .bind(summary.total_appearances)
        .bind(summary.avg_cpu_percent)
        .bind(summary.avg_memory_percent)
        .fetch_one(pool)
        .await
    }

    pub async fn for_agent(pool: &PgPool, agent_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProcessBaseline>(
            "SELECT * FROM process_baselines WHERE agent_id = $1 ORDER BY frequency DESC, process_name ASC",
        )
        .bind(agent_id)
        .fetch_all(pool)
        .await
    }
}

impl PortBaseline {
    pub async fn upsert(
        pool: &PgPool,
        agent_id: &str,
        port: i32,
        protocol: &str,
        summary: &EntitySummary,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PortBaseline>(PORT_UPSERT_SQL)
        .bind(agent_id)
        .bind(port)
        .bind(protocol)
        .bind(summary.frequency)
        .bind(summary.tier.as_str())
        .bind(summary.first_seen)
        .bind(summary.last_seen)
        .bind(summary.total_appearances)
        .fetch_one(pool)
        .await
    }

    pub async fn for_agent(pool: &PgPool, agent_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PortBaseline>(
            "SELECT * FROM port_baselines WHERE agent_id = $1 ORDER BY frequency DESC, port ASC",
        )
        .bind(agent_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuild_upserts_preserve_first_seen() {
        for sql in [PROCESS_UPSERT_SQL, PORT_UPSERT_SQL] {
            let update_clause = sql
                .split("DO UPDATE SET")
                .nth(1)
                .expect("upsert must have a conflict branch");
            assert!(!update_clause.contains("first_seen"));
            assert!(update_clause.contains("last_seen = EXCLUDED.last_seen"));
            assert!(update_clause.contains("frequency = EXCLUDED.frequency"));
        }
    }
}
