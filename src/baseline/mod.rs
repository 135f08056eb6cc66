//! Baseline core - snapshot lifecycle, exact-match diffing, frequency tiers
//!
//! A baseline is the accepted "normal" inventory for one host+category,
//! materialized as an immutable snapshot of (key, value, type) items. This
//! module owns the lifecycle state machine (LEARNING -> ACTIVE, plus the
//! import/copy/manual shortcuts that force ACTIVE with a fresh snapshot);
//! the diff and frequency engines live in the submodules.

pub mod compare;
pub mod frequency;
pub mod item;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::BTreeMap;

use crate::error::{AppError, AppResult};
use crate::models::baseline::{BaselineConfig, BaselineItem, BaselineSnapshot};
use crate::models::inventory::{CurrentItem, HistoryItem};
use item::CanonicalItem;

/// Monitored inventory class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Process,
    Port,
    Usb,
    Login,
    Software,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Process,
        Category::Port,
        Category::Usb,
        Category::Login,
        Category::Software,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Process => "PROCESS",
            Category::Port => "PORT",
            Category::Usb => "USB",
            Category::Login => "LOGIN",
            Category::Software => "SOFTWARE",
        }
    }

    /// Lowercase item type tag stored on baseline items.
    pub fn item_type(&self) -> &'static str {
        match self {
            Category::Process => "process",
            Category::Port => "port",
            Category::Usb => "usb",
            Category::Login => "login",
            Category::Software => "software",
        }
    }

    /// Only PROCESS and PORT keep round-tagged history rows.
    pub fn has_history(&self) -> bool {
        matches!(self, Category::Process | Category::Port)
    }

    pub fn parse(s: &str) -> Option<Category> {
        match s.to_ascii_uppercase().as_str() {
            "PROCESS" => Some(Category::Process),
            "PORT" => Some(Category::Port),
            "USB" => Some(Category::Usb),
            "LOGIN" => Some(Category::Login),
            "SOFTWARE" => Some(Category::Software),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one compared item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnomalyKind {
    New,
    Missing,
    Modified,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::New => "NEW",
            AnomalyKind::Missing => "MISSING",
            AnomalyKind::Modified => "MODIFIED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

/// How the host-entity frequency over a window of rounds is classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FrequencyTier {
    New,
    Rare,
    Common,
    Always,
}

impl FrequencyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrequencyTier::Always => "ALWAYS",
            FrequencyTier::Common => "COMMON",
            FrequencyTier::Rare => "RARE",
            FrequencyTier::New => "NEW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LearnMode {
    Quick,
    Standard,
    Custom,
    Manual,
}

impl LearnMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearnMode::Quick => "QUICK",
            LearnMode::Standard => "STANDARD",
            LearnMode::Custom => "CUSTOM",
            LearnMode::Manual => "MANUAL",
        }
    }

    fn default_days(&self) -> i64 {
        match self {
            LearnMode::Quick => 1,
            LearnMode::Standard => 7,
            LearnMode::Custom | LearnMode::Manual => 7,
        }
    }
}

/// Provenance of a config/snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CreatedType {
    Learning,
    Import,
    Copy,
    Manual,
}

impl CreatedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreatedType::Learning => "LEARNING",
            CreatedType::Import => "IMPORT",
            CreatedType::Copy => "COPY",
            CreatedType::Manual => "MANUAL",
        }
    }
}

// ===== Lifecycle operations =====

/// Create or reset the config for (agent, category) into LEARNING with the
/// window [now, now + days].
pub async fn start_learn(
    pool: &PgPool,
    agent_id: &str,
    category: Category,
    mode: LearnMode,
    days: Option<i64>,
) -> AppResult<BaselineConfig> {
    if mode == LearnMode::Manual {
        return Err(AppError::ValidationError(
            "MANUAL mode is not a learning mode; use the manual-create operation".to_string(),
        ));
    }

    let learning_days = match days {
        Some(d) if d > 0 => d,
        _ => mode.default_days(),
    };

    tracing::info!(
        "Starting {} learning for agent {} category {} ({} days)",
        mode.as_str(),
        agent_id,
        category,
        learning_days
    );

    let config =
        BaselineConfig::upsert_learning(pool, agent_id, category, mode, learning_days).await?;
    Ok(config)
}

/// Flip a LEARNING config to ACTIVE and build a snapshot from the history
/// accumulated over the learning window. No-op when the config is already
/// ACTIVE; if the window holds no data the config activates without a
/// snapshot and comparisons keep reporting "no baseline".
pub async fn complete_learning(
    pool: &PgPool,
    agent_id: &str,
    category: Category,
) -> AppResult<BaselineConfig> {
    let config = BaselineConfig::find(pool, agent_id, category)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "no baseline config for agent {} category {}",
                agent_id, category
            ))
        })?;

    if config.status != "LEARNING" {
        tracing::debug!(
            "completeLearning is a no-op for agent {} category {} in status {}",
            agent_id,
            category,
            config.status
        );
        return Ok(config);
    }

    let config = BaselineConfig::set_active(pool, config.id).await?;
    tracing::info!("Learning completed for agent {} category {}", agent_id, category);

    let since = Utc::now() - Duration::days(config.learning_days as i64);
    let items = learned_items(pool, agent_id, category, since).await?;

    if items.is_empty() {
        tracing::warn!(
            "No historical data found for agent {} category {}; activated without snapshot",
            agent_id,
            category
        );
    } else {
        create_snapshot(pool, agent_id, category, config.id, &items).await?;
    }

    Ok(config)
}

/// Adopt the host's latest live inventory as its baseline.
pub async fn import_from_current(
    pool: &PgPool,
    agent_id: &str,
    category: Category,
) -> AppResult<BaselineConfig> {
    tracing::info!("Importing current data as baseline for agent {} category {}", agent_id, category);

    let items: Vec<CanonicalItem> = CurrentItem::for_agent(pool, agent_id, category)
        .await?
        .into_iter()
        .map(|row| row.into_canonical())
        .collect();

    force_active(pool, agent_id, category, CreatedType::Import, None, &items).await
}

/// Clone another host's latest snapshot as this host's baseline.
pub async fn copy_from_agent(
    pool: &PgPool,
    source_agent_id: &str,
    target_agent_id: &str,
    category: Category,
) -> AppResult<BaselineConfig> {
    tracing::info!(
        "Copying {} baseline from agent {} to {}",
        category,
        source_agent_id,
        target_agent_id
    );

    let snapshot = BaselineSnapshot::latest(pool, source_agent_id, category)
        .await?
        .ok_or_else(|| AppError::NoBaseline {
            agent_id: source_agent_id.to_string(),
            category: category.as_str().to_string(),
        })?;

    let items: Vec<CanonicalItem> = BaselineItem::for_snapshot(pool, snapshot.id)
        .await?
        .into_iter()
        .map(|row| row.into_canonical())
        .collect();

    force_active(
        pool,
        target_agent_id,
        category,
        CreatedType::Copy,
        Some(source_agent_id),
        &items,
    )
    .await
}

/// Build a baseline from caller-supplied items.
pub async fn manual_create(
    pool: &PgPool,
    agent_id: &str,
    category: Category,
    items: &[CanonicalItem],
) -> AppResult<BaselineConfig> {
    tracing::info!(
        "Manual baseline creation for agent {} category {} with {} items",
        agent_id,
        category,
        items.len()
    );

    force_active(pool, agent_id, category, CreatedType::Manual, None, items).await
}

/// Remove the config plus all of its snapshots and their items. Idempotent.
pub async fn delete_baseline(pool: &PgPool, agent_id: &str, category: Category) -> AppResult<()> {
    let deleted = BaselineConfig::delete(pool, agent_id, category).await?;
    if deleted {
        tracing::info!("Baseline deleted for agent {} category {}", agent_id, category);
    }
    Ok(())
}

/// Persist a snapshot and its items in one transaction; the previous latest
/// snapshot (if any) gets its validity window closed.
pub async fn create_snapshot(
    pool: &PgPool,
    agent_id: &str,
    category: Category,
    config_id: uuid::Uuid,
    items: &[CanonicalItem],
) -> AppResult<BaselineSnapshot> {
    let snapshot_hash = item::snapshot_hash(items);

    let mut tx = pool.begin().await?;
    BaselineSnapshot::close_open(&mut tx, agent_id, category).await?;
    let snapshot = BaselineSnapshot::insert(
        &mut tx,
        config_id,
        agent_id,
        category,
        &snapshot_hash,
        items.len() as i32,
    )
    .await?;
    BaselineItem::insert_many(&mut tx, snapshot.id, items).await?;
    tx.commit().await?;

    tracing::info!(
        "Snapshot created for agent {} category {} with {} items, hash {}",
        agent_id,
        category,
        items.len(),
        snapshot_hash
    );
    Ok(snapshot)
}

async fn force_active(
    pool: &PgPool,
    agent_id: &str,
    category: Category,
    created_type: CreatedType,
    source_agent_id: Option<&str>,
    items: &[CanonicalItem],
) -> AppResult<BaselineConfig> {
    let config =
        BaselineConfig::upsert_active(pool, agent_id, category, created_type, source_agent_id)
            .await?;
    create_snapshot(pool, agent_id, category, config.id, items).await?;
    Ok(config)
}

/// Canonical items learned over a window. PROCESS/PORT read the round-tagged
/// history; the remaining categories have no history and fall back to the
/// latest current inventory. Duplicate keys across rounds collapse to the
/// most recent observation.
async fn learned_items(
    pool: &PgPool,
    agent_id: &str,
    category: Category,
    since: chrono::DateTime<Utc>,
) -> AppResult<Vec<CanonicalItem>> {
    if !category.has_history() {
        return Ok(CurrentItem::for_agent(pool, agent_id, category)
            .await?
            .into_iter()
            .map(|row| row.into_canonical())
            .collect());
    }

    let rows = HistoryItem::since(pool, agent_id, category, since).await?;
    let mut by_key: BTreeMap<String, CanonicalItem> = BTreeMap::new();
    for row in rows {
        // rows arrive oldest-first, so later rounds win
        by_key.insert(row.item_key.clone(), row.into_canonical());
    }
    Ok(by_key.into_values().collect())
}
