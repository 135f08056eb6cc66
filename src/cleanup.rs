//! Periodic retention cleanup for inventory history
//!
//! History rows older than the retention window are deleted on a fixed
//! interval so the frequency tables stay bounded. Current inventory and
//! baseline snapshots are never touched here.

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;

use crate::config::Config;
use crate::models::HistoryItem;

/// Spawn the background cleanup loop.
pub fn spawn(pool: PgPool, config: &Config) {
    let retention_days = config.retention_days;
    let interval = Duration::from_secs(config.cleanup_interval_secs);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let cutoff = Utc::now() - chrono::Duration::days(retention_days);
            match HistoryItem::prune_before(&pool, cutoff).await {
                Ok(0) => {
                    tracing::debug!("History cleanup: nothing to prune before {}", cutoff);
                }
                Ok(deleted) => {
                    tracing::info!(
                        "History cleanup: pruned {} rows older than {} days",
                        deleted,
                        retention_days
                    );
                }
                Err(err) => {
                    tracing::error!("History cleanup failed: {}", err);
                }
            }
        }
    });
}
