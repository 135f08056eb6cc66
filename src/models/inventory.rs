//! Inventory rows - latest state per host+category plus round-tagged history
//!
//! `inventory_current` is replaced wholesale on every upload; it is the
//! current-state source for on-demand comparison and baseline import.
//! `inventory_history` accumulates PROCESS/PORT rows tagged with their
//! collection round and feeds the frequency engine and learning completion.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::baseline::item::CanonicalItem;
use crate::baseline::Category;

/// Canonicalized fields persisted for one uploaded record.
#[derive(Debug, Clone)]
pub struct NewInventoryItem {
    pub item_key: String,
    pub entity_key: String,
    pub item_value: String,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CurrentItem {
    pub id: i64,
    pub agent_id: String,
    pub category: String,
    pub item_key: String,
    pub entity_key: String,
    pub item_value: String,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct HistoryItem {
    pub id: i64,
    pub agent_id: String,
    pub category: String,
    pub collection_round: i64,
    pub item_key: String,
    pub entity_key: String,
    pub item_value: String,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub collected_at: DateTime<Utc>,
}

impl CurrentItem {
    /// Replace the host's current inventory for one category in a single
    /// transaction.
    pub async fn replace(
        pool: &PgPool,
        agent_id: &str,
        category: Category,
        items: &[NewInventoryItem],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM inventory_current WHERE agent_id = $1 AND category = $2")
            .bind(agent_id)
            .bind(category.as_str())
            .execute(&mut *tx)
            .await?;
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO inventory_current
                    (agent_id, category, item_key, entity_key, item_value, cpu_percent, memory_percent)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(agent_id)
            .bind(category.as_str())
            .bind(&item.item_key)
            .bind(&item.entity_key)
            .bind(&item.item_value)
            .bind(item.cpu_percent)
            .bind(item.memory_percent)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }

    pub async fn for_agent(
        pool: &PgPool,
        agent_id: &str,
        category: Category,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, CurrentItem>(
            r#"
            SELECT * FROM inventory_current
            WHERE agent_id = $1 AND category = $2
            ORDER BY item_key ASC
            "#,
        )
        .bind(agent_id)
        .bind(category.as_str())
        .fetch_all(pool)
        .await
    }

    pub fn into_canonical(self) -> CanonicalItem {
        CanonicalItem {
            key: self.item_key,
            value: self.item_value,
            item_type: self.category.to_lowercase(),
        }
    }
}

impl HistoryItem {
    pub async fn append(
        pool: &PgPool,
        agent_id: &str,
        category: Category,
        collection_round: i64,
        items: &[NewInventoryItem],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO inventory_history
                    (agent_id, category, collection_round, item_key, entity_key, item_value, cpu_percent, memory_percent)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(agent_id)
            .bind(category.as_str())
            .bind(collection_round)
            .bind(&item.item_key)
            .bind(&item.entity_key)
            .bind(&item.item_value)
            .bind(item.cpu_percent)
            .bind(item.memory_percent)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }

    /// The most recent `limit` distinct round numbers, newest first.
    pub async fn recent_rounds(
        pool: &PgPool,
        agent_id: &str,
        category: Category,
        limit: i64,
    ) -> Result<Vec<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT DISTINCT collection_round FROM inventory_history
            WHERE agent_id = $1 AND category = $2
            ORDER BY collection_round DESC
            LIMIT $3
            "#,
        )
        .bind(agent_id)
        .bind(category.as_str())
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn in_rounds(
        pool: &PgPool,
        agent_id: &str,
        category: Category,
        rounds: &[i64],
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, HistoryItem>(
            r#"
            SELECT * FROM inventory_history
            WHERE agent_id = $1 AND category = $2 AND collection_round = ANY($3)
            ORDER BY collection_round ASC, id ASC
            "#,
        )
        .bind(agent_id)
        .bind(category.as_str())
        .bind(rounds)
        .fetch_all(pool)
        .await
    }

    /// History rows collected at or after `since`, oldest first.
    pub async fn since(
        pool: &PgPool,
        agent_id: &str,
        category: Category,
        since: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, HistoryItem>(
            r#"
            SELECT * FROM inventory_history
            WHERE agent_id = $1 AND category = $2 AND collected_at >= $3
            ORDER BY collected_at ASC, id ASC
            "#,
        )
        .bind(agent_id)
        .bind(category.as_str())
        .bind(since)
        .fetch_all(pool)
        .await
    }

    /// Highest round number ever persisted for the host, 0 when none. Seeds
    /// the in-memory counter after a restart.
    pub async fn max_round(pool: &PgPool, agent_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(collection_round), 0) FROM inventory_history WHERE agent_id = $1",
        )
        .bind(agent_id)
        .fetch_one(pool)
        .await
    }

    pub async fn prune_before(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM inventory_history WHERE collected_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub fn into_canonical(self) -> CanonicalItem {
        CanonicalItem {
            key: self.item_key,
            value: self.item_value,
            item_type: self.category.to_lowercase(),
        }
    }
}
