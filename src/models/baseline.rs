//! Baseline config / snapshot / item rows

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::baseline::item::{self, CanonicalItem};
use crate::baseline::{Category, CreatedType, LearnMode};

/// One per (agent, category); LEARNING or ACTIVE.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BaselineConfig {
    pub id: Uuid,
    pub agent_id: String,
    pub category: String,
    pub status: String,
    pub learning_mode: String,
    pub learning_days: i32,
    pub learn_start: Option<DateTime<Utc>>,
    pub learn_end: Option<DateTime<Utc>>,
    pub sensitivity: String,
    pub alert_enabled: bool,
    pub created_type: String,
    pub source_agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable capture of a baseline; items hang off it.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BaselineSnapshot {
    pub id: Uuid,
    pub config_id: Uuid,
    pub agent_id: String,
    pub category: String,
    pub snapshot_hash: String,
    pub item_count: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BaselineItem {
    pub id: i64,
    pub snapshot_id: Uuid,
    pub item_key: String,
    pub item_value: String,
    pub item_type: String,
    pub item_hash: String,
}

impl BaselineConfig {
    pub async fn find(
        pool: &PgPool,
        agent_id: &str,
        category: Category,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, BaselineConfig>(
            "SELECT * FROM baseline_configs WHERE agent_id = $1 AND category = $2",
        )
        .bind(agent_id)
        .bind(category.as_str())
        .fetch_optional(pool)
        .await
    }

    pub async fn find_all(pool: &PgPool, agent_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, BaselineConfig>(
            "SELECT * FROM baseline_configs WHERE agent_id = $1 ORDER BY category ASC",
        )
        .bind(agent_id)
        .fetch_all(pool)
        .await
    }

    /// Create or reset a config into LEARNING with the window
    /// [now, now + days].
    pub async fn upsert_learning(
        pool: &PgPool,
        agent_id: &str,
        category: Category,
        mode: LearnMode,
        learning_days: i64,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, BaselineConfig>(
            r#"
            INSERT INTO baseline_configs
                (agent_id, category, status, learning_mode, learning_days,
                 learn_start, learn_end, created_type)
            VALUES ($1, $2, 'LEARNING', $3, $4, NOW(), NOW() + make_interval(days => $4::int), 'LEARNING')
            ON CONFLICT (agent_id, category) DO UPDATE SET
                status = 'LEARNING',
                learning_mode = EXCLUDED.learning_mode,
                learning_days = EXCLUDED.learning_days,
                learn_start = NOW(),
                learn_end = NOW() + make_interval(days => $4::int),
                created_type = 'LEARNING',
                source_agent_id = NULL,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(agent_id)
        .bind(category.as_str())
        .bind(mode.as_str())
        .bind(learning_days)
        .fetch_one(pool)
        .await
    }

    /// Create or reset a config directly into ACTIVE (import/copy/manual).
    pub async fn upsert_active(
        pool: &PgPool,
        agent_id: &str,
        category: Category,
        created_type: CreatedType,
        source_agent_id: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, BaselineConfig>(
            r#"
            INSERT INTO baseline_configs
                (agent_id, category, status, learning_mode, learning_days,
                 learn_start, learn_end, created_type, source_agent_id)
            VALUES ($1, $2, 'ACTIVE', 'MANUAL', 0, NOW(), NOW(), $3, $4)
            ON CONFLICT (agent_id, category) DO UPDATE SET
                status = 'ACTIVE',
                learning_mode = 'MANUAL',
                learn_start = NOW(),
                learn_end = NOW(),
                created_type = EXCLUDED.created_type,
                source_agent_id = EXCLUDED.source_agent_id,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(agent_id)
        .bind(category.as_str())
        .bind(created_type.as_str())
        .bind(source_agent_id)
        .fetch_one(pool)
        .await
    }

    pub async fn set_active(pool: &PgPool, id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, BaselineConfig>(
            "UPDATE baseline_configs SET status = 'ACTIVE', updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_one(pool)
        .await
    }

    /// Snapshots and their items go with it via FK cascade.
    pub async fn delete(
        pool: &PgPool,
        agent_id: &str,
        category: Category,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM baseline_configs WHERE agent_id = $1 AND category = $2")
                .bind(agent_id)
                .bind(category.as_str())
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

impl BaselineSnapshot {
    /// The snapshot comparisons run against: most recently created for the
    /// host+category.
    pub async fn latest(
        pool: &PgPool,
        agent_id: &str,
        category: Category,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, BaselineSnapshot>(
            r#"
            SELECT * FROM baseline_snapshots
            WHERE agent_id = $1 AND category = $2
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(agent_id)
        .bind(category.as_str())
        .fetch_optional(pool)
        .await
    }

    pub async fn list(
        pool: &PgPool,
        agent_id: &str,
        category: Category,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, BaselineSnapshot>(
            r#"
            SELECT * FROM baseline_snapshots
            WHERE agent_id = $1 AND category = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(agent_id)
        .bind(category.as_str())
        .fetch_all(pool)
        .await
    }

    /// Close the validity window of the currently open snapshot, if any.
    pub async fn close_open(
        tx: &mut Transaction<'_, Postgres>,
        agent_id: &str,
        category: Category,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE baseline_snapshots SET valid_to = NOW()
            WHERE agent_id = $1 AND category = $2 AND valid_to IS NULL
            "#,
        )
        .bind(agent_id)
        .bind(category.as_str())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        config_id: Uuid,
        agent_id: &str,
        category: Category,
        snapshot_hash: &str,
        item_count: i32,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, BaselineSnapshot>(
            r#"
            INSERT INTO baseline_snapshots (config_id, agent_id, category, snapshot_hash, item_count)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(config_id)
        .bind(agent_id)
        .bind(category.as_str())
        .bind(snapshot_hash)
        .bind(item_count)
        .fetch_one(&mut **tx)
        .await
    }
}

impl BaselineItem {
    pub async fn for_snapshot(pool: &PgPool, snapshot_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, BaselineItem>(
            "SELECT * FROM baseline_items WHERE snapshot_id = $1 ORDER BY id ASC",
        )
        .bind(snapshot_id)
        .fetch_all(pool)
        .await
    }

    /// Bind items to a freshly inserted snapshot inside the same
    /// transaction, so a reader never sees a snapshot whose item count
    /// disagrees with its items.
    pub async fn insert_many(
        tx: &mut Transaction<'_, Postgres>,
        snapshot_id: Uuid,
        items: &[CanonicalItem],
    ) -> Result<(), sqlx::Error> {
        for canonical in items {
            sqlx::query(
                r#"
                INSERT INTO baseline_items (snapshot_id, item_key, item_value, item_type, item_hash)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(snapshot_id)
            .bind(&canonical.key)
            .bind(&canonical.value)
            .bind(&canonical.item_type)
            .bind(item::item_hash(canonical))
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    pub fn into_canonical(self) -> CanonicalItem {
        CanonicalItem {
            key: self.item_key,
            value: self.item_value,
            item_type: self.item_type,
        }
    }
}
