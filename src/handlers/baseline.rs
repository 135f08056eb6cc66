//! Baseline lifecycle, comparison and frequency handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::baseline::{self, compare, frequency, Category, LearnMode};
use crate::baseline::compare::CompareResult;
use crate::baseline::item::CanonicalItem;
use crate::models::baseline::{BaselineConfig, BaselineItem, BaselineSnapshot};
use crate::models::frequency::{PortBaseline, ProcessBaseline};
use crate::{AppError, AppResult, AppState};

fn parse_category(raw: &str) -> AppResult<Category> {
    Category::parse(raw)
        .ok_or_else(|| AppError::ValidationError(format!("unknown category: {}", raw)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct LearnRequest {
    pub mode: LearnMode,
    #[validate(range(min = 1, max = 365))]
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CopyRequest {
    pub source_agent_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ManualCreateRequest {
    pub items: Vec<ManualItem>,
}

#[derive(Debug, Deserialize)]
pub struct ManualItem {
    #[serde(alias = "item_key")]
    pub key: String,
    #[serde(default, alias = "item_value")]
    pub value: String,
    #[serde(alias = "type")]
    pub item_type: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FrequencyRebuildRequest {
    pub category: Category,
    #[validate(range(min = 1, max = 1000))]
    pub rounds: i64,
}

/// Start (or restart) learning for a host+category
pub async fn learn(
    State(state): State<AppState>,
    Path((agent_id, category)): Path<(String, String)>,
    Json(req): Json<LearnRequest>,
) -> AppResult<Json<BaselineConfig>> {
    req.validate()?;
    let category = parse_category(&category)?;
    let config = baseline::start_learn(&state.pool, &agent_id, category, req.mode, req.days).await?;
    Ok(Json(config))
}

/// Finish learning: activate the config and snapshot the learned window
pub async fn complete(
    State(state): State<AppState>,
    Path((agent_id, category)): Path<(String, String)>,
) -> AppResult<Json<BaselineConfig>> {
    let category = parse_category(&category)?;
    let config = baseline::complete_learning(&state.pool, &agent_id, category).await?;
    Ok(Json(config))
}

/// Adopt the host's current inventory as its baseline
pub async fn import(
    State(state): State<AppState>,
    Path((agent_id, category)): Path<(String, String)>,
) -> AppResult<Json<BaselineConfig>> {
    let category = parse_category(&category)?;
    let config = baseline::import_from_current(&state.pool, &agent_id, category).await?;
    Ok(Json(config))
}

/// Copy another host's latest snapshot onto this host
pub async fn copy(
    State(state): State<AppState>,
    Path((agent_id, category)): Path<(String, String)>,
    Json(req): Json<CopyRequest>,
) -> AppResult<Json<BaselineConfig>> {
    let category = parse_category(&category)?;
    let config =
        baseline::copy_from_agent(&state.pool, &req.source_agent_id, &agent_id, category).await?;
    Ok(Json(config))
}

/// Build a baseline from caller-supplied items
pub async fn manual(
    State(state): State<AppState>,
    Path((agent_id, category)): Path<(String, String)>,
    Json(req): Json<ManualCreateRequest>,
) -> AppResult<Json<BaselineConfig>> {
    let category = parse_category(&category)?;
    let items: Vec<CanonicalItem> = req
        .items
        .into_iter()
        .map(|item| CanonicalItem {
            key: item.key,
            value: item.value,
            item_type: item.item_type.unwrap_or_else(|| category.item_type().to_string()),
        })
        .collect();
    let config = baseline::manual_create(&state.pool, &agent_id, category, &items).await?;
    Ok(Json(config))
}

/// Drop the config and every snapshot/item under it
pub async fn delete(
    State(state): State<AppState>,
    Path((agent_id, category)): Path<(String, String)>,
) -> AppResult<Json<serde_json::Value>> {
    let category = parse_category(&category)?;
    baseline::delete_baseline(&state.pool, &agent_id, category).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn configs(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> AppResult<Json<Vec<BaselineConfig>>> {
    Ok(Json(BaselineConfig::find_all(&state.pool, &agent_id).await?))
}

pub async fn snapshots(
    State(state): State<AppState>,
    Path((agent_id, category)): Path<(String, String)>,
) -> AppResult<Json<Vec<BaselineSnapshot>>> {
    let category = parse_category(&category)?;
    Ok(Json(BaselineSnapshot::list(&state.pool, &agent_id, category).await?))
}

/// Items of the latest snapshot
pub async fn items(
    State(state): State<AppState>,
    Path((agent_id, category)): Path<(String, String)>,
) -> AppResult<Json<Vec<BaselineItem>>> {
    let category = parse_category(&category)?;
    let snapshot = BaselineSnapshot::latest(&state.pool, &agent_id, category)
        .await?
        .ok_or_else(|| AppError::NoBaseline {
            agent_id: agent_id.clone(),
            category: category.as_str().to_string(),
        })?;
    Ok(Json(BaselineItem::for_snapshot(&state.pool, snapshot.id).await?))
}

/// On-demand diff of current inventory against the latest snapshot
pub async fn compare_current(
    State(state): State<AppState>,
    Path((agent_id, category)): Path<(String, String)>,
) -> AppResult<Json<CompareResult>> {
    let category = parse_category(&category)?;
    let result = compare::compare(&state.pool, &agent_id, category).await?;
    Ok(Json(result))
}

/// Recompute the frequency baseline over the last N rounds
pub async fn rebuild_frequency(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(req): Json<FrequencyRebuildRequest>,
) -> AppResult<Json<serde_json::Value>> {
    req.validate()?;
    frequency::rebuild(&state.pool, &agent_id, req.category, req.rounds).await?;
    Ok(Json(serde_json::json!({ "rebuilt": true })))
}

pub async fn process_frequency(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> AppResult<Json<Vec<ProcessBaseline>>> {
    Ok(Json(ProcessBaseline::for_agent(&state.pool, &agent_id).await?))
}

pub async fn port_frequency(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> AppResult<Json<Vec<PortBaseline>>> {
    Ok(Json(PortBaseline::for_agent(&state.pool, &agent_id).await?))
}
