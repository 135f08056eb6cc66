//! Security alert model - findings recorded by the detection engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Row};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SecurityAlert {
    pub id: i64,
    pub agent_id: String,
    pub alert_type: String,
    pub alert_level: String,
    pub alert_title: String,
    pub alert_content: Option<String>,
    pub anomaly_type: Option<String>,
    pub baseline_item: Option<String>,
    pub current_item: Option<String>,
    pub alert_status: String,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_note: Option<String>,
    pub ignored_at: Option<DateTime<Utc>>,
    pub ignored_by: Option<String>,
    pub ignore_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub agent_id: String,
    pub alert_type: String,
    pub alert_level: String,
    pub alert_title: String,
    pub alert_content: String,
    pub anomaly_type: Option<String>,
    pub baseline_item: Option<String>,
    pub current_item: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AlertFilter {
    pub agent_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AlertStats {
    pub total_new: i64,
    pub total_acknowledged: i64,
    pub total_resolved: i64,
    pub total_ignored: i64,
    pub high_unresolved: i64,
    pub total_alerts: i64,
}

impl SecurityAlert {
    pub async fn create(pool: &PgPool, alert: NewAlert) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, SecurityAlert>(
            r#"
            INSERT INTO security_alerts
                (agent_id, alert_type, alert_level, alert_title, alert_content,
                 anomaly_type, baseline_item, current_item)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&alert.agent_id)
        .bind(&alert.alert_type)
        .bind(&alert.alert_level)
        .bind(&alert.alert_title)
        .bind(&alert.alert_content)
        .bind(&alert.anomaly_type)
        .bind(&alert.baseline_item)
        .bind(&alert.current_item)
        .fetch_one(pool)
        .await
    }

    pub async fn list(pool: &PgPool, filter: AlertFilter) -> Result<Vec<Self>, sqlx::Error> {
        let limit = filter.limit.unwrap_or(100);
        let offset = filter.offset.unwrap_or(0);

        sqlx::query_as::<_, SecurityAlert>(
            r#"
            SELECT * FROM security_alerts
            WHERE ($1::text IS NULL OR agent_id = $1)
              AND ($2::text IS NULL OR alert_status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&filter.agent_id)
        .bind(&filter.status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, SecurityAlert>("SELECT * FROM security_alerts WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn acknowledge(
        pool: &PgPool,
        id: i64,
        acknowledged_by: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, SecurityAlert>(
            r#"
            UPDATE security_alerts
            SET alert_status = 'ACKNOWLEDGED', acknowledged_at = NOW(), acknowledged_by = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(acknowledged_by)
        .fetch_optional(pool)
        .await
    }

    pub async fn resolve(
        pool: &PgPool,
        id: i64,
        resolved_by: &str,
        resolution_note: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, SecurityAlert>(
            r#"
            UPDATE security_alerts
            SET alert_status = 'RESOLVED', resolved_at = NOW(), resolved_by = $2, resolution_note = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(resolved_by)
        .bind(resolution_note)
        .fetch_optional(pool)
        .await
    }

    pub async fn ignore(
        pool: &PgPool,
        id: i64,
        ignored_by: &str,
        ignore_reason: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, SecurityAlert>(
            r#"
            UPDATE security_alerts
            SET alert_status = 'IGNORED', ignored_at = NOW(), ignored_by = $2, ignore_reason = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(ignored_by)
        .bind(ignore_reason)
        .fetch_optional(pool)
        .await
    }

    pub async fn stats(pool: &PgPool) -> Result<AlertStats, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE alert_status = 'NEW') AS total_new,
                COUNT(*) FILTER (WHERE alert_status = 'ACKNOWLEDGED') AS total_acknowledged,
                COUNT(*) FILTER (WHERE alert_status = 'RESOLVED') AS total_resolved,
                COUNT(*) FILTER (WHERE alert_status = 'IGNORED') AS total_ignored,
                COUNT(*) FILTER (WHERE alert_level = 'HIGH' AND alert_status IN ('NEW', 'ACKNOWLEDGED')) AS high_unresolved,
                COUNT(*) AS total_alerts
            FROM security_alerts
            "#,
        )
        .fetch_one(pool)
        .await?;

        Ok(AlertStats {
            total_new: row.get("total_new"),
            total_acknowledged: row.get("total_acknowledged"),
            total_resolved: row.get("total_resolved"),
            total_ignored: row.get("total_ignored"),
            high_unresolved: row.get("high_unresolved"),
            total_alerts: row.get("total_alerts"),
        })
    }
}
