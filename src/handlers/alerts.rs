//! Alert handlers - listing and status lifecycle

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::models::alert::{AlertFilter, AlertStats, SecurityAlert};
use crate::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct AcknowledgeRequest {
    pub acknowledged_by: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolved_by: String,
    pub resolution_note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IgnoreRequest {
    pub ignored_by: String,
    pub ignore_reason: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<AlertFilter>,
) -> AppResult<Json<Vec<SecurityAlert>>> {
    Ok(Json(SecurityAlert::list(&state.pool, filter).await?))
}

pub async fn stats(State(state): State<AppState>) -> AppResult<Json<AlertStats>> {
    Ok(Json(SecurityAlert::stats(&state.pool).await?))
}

pub async fn acknowledge(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<AcknowledgeRequest>,
) -> AppResult<Json<SecurityAlert>> {
    let alert = SecurityAlert::acknowledge(&state.pool, id, &req.acknowledged_by)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Alert not found: {}", id)))?;
    tracing::info!("Alert {} acknowledged by {}", id, req.acknowledged_by);
    Ok(Json(alert))
}

pub async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ResolveRequest>,
) -> AppResult<Json<SecurityAlert>> {
    let alert = SecurityAlert::resolve(&state.pool, id, &req.resolved_by, req.resolution_note.as_deref())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Alert not found: {}", id)))?;
    tracing::info!("Alert {} resolved by {}", id, req.resolved_by);
    Ok(Json(alert))
}

pub async fn ignore(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<IgnoreRequest>,
) -> AppResult<Json<SecurityAlert>> {
    let alert = SecurityAlert::ignore(&state.pool, id, &req.ignored_by, req.ignore_reason.as_deref())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Alert not found: {}", id)))?;
    tracing::info!("Alert {} ignored by {}", id, req.ignored_by);
    Ok(Json(alert))
}
