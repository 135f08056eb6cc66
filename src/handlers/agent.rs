//! Agent handlers - report ingestion, heartbeat, host registry

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::baseline::item::InventoryRecord;
use crate::baseline::{compare, Category};
use crate::models::{Agent, AgentInfo, CurrentItem, HeartbeatRequest, HeartbeatResponse, HistoryItem};
use crate::{AppError, AppResult, AppState};

/// Full inventory report uploaded by a monitored host. Absent categories
/// are left untouched; present-but-empty lists clear the current state.
#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub agent: AgentInfo,
    pub data: ReportData,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportData {
    pub processes: Option<Vec<serde_json::Value>>,
    pub ports: Option<Vec<serde_json::Value>>,
    pub usb_devices: Option<Vec<serde_json::Value>>,
    pub login_logs: Option<Vec<serde_json::Value>>,
    pub installed_software: Option<Vec<serde_json::Value>>,
}

impl ReportData {
    fn records_for(&self, category: Category) -> Option<&Vec<serde_json::Value>> {
        match category {
            Category::Process => self.processes.as_ref(),
            Category::Port => self.ports.as_ref(),
            Category::Usb => self.usb_devices.as_ref(),
            Category::Login => self.login_logs.as_ref(),
            Category::Software => self.installed_software.as_ref(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub accepted: bool,
    pub collection_round: i64,
    pub skipped_items: usize,
    pub alerts_recorded: usize,
    pub server_time: i64,
}

/// Ingest one upload batch: register the host, issue a collection round,
/// persist current + history rows per category, then run detection against
/// any ACTIVE baseline. Detection is best-effort relative to ingestion, and
/// one category failing never blocks the others.
pub async fn report(
    State(state): State<AppState>,
    Json(req): Json<ReportRequest>,
) -> AppResult<Json<ReportResponse>> {
    let agent = Agent::register_or_update(&state.pool, &req.agent).await?;
    let agent_id = agent.id.as_str();

    // First upload after a restart: resume numbering from persisted history
    if state.rounds.current_round(agent_id) == 0 {
        let max_round = HistoryItem::max_round(&state.pool, agent_id).await?;
        if max_round > 0 {
            state.rounds.ensure_at_least(agent_id, max_round);
        }
    }
    let round = state.rounds.next_round(agent_id);
    tracing::info!("Saving monitor data for agent {} (round {})", agent_id, round);

    let mut skipped_items = 0;
    let mut alerts_recorded = 0;

    for category in Category::ALL {
        let Some(raw_records) = req.data.records_for(category) else {
            tracing::debug!("No {} data received for agent {}", category, agent_id);
            continue;
        };

        let mut records = Vec::with_capacity(raw_records.len());
        for raw in raw_records {
            match InventoryRecord::parse(category, raw) {
                Ok(record) => records.push(record),
                Err(err) => {
                    skipped_items += 1;
                    tracing::warn!(
                        "Skipping malformed {} record for agent {}: {}",
                        category,
                        agent_id,
                        err
                    );
                }
            }
        }

        if let Err(err) = persist_category(&state, agent_id, category, round, &records).await {
            tracing::error!(
                "Failed to persist {} inventory for agent {}: {}",
                category,
                agent_id,
                err
            );
            continue;
        }

        // Detection must never undo the ingest that just happened.
        let current: Vec<_> = records.iter().map(|r| r.canonical()).collect();
        match compare::detect_and_alert(&state.pool, agent_id, category, &current).await {
            Ok(count) => alerts_recorded += count,
            Err(err) => tracing::error!(
                "Anomaly detection failed for agent {} category {}: {}",
                agent_id,
                category,
                err
            ),
        }
    }

    Ok(Json(ReportResponse {
        accepted: true,
        collection_round: round,
        skipped_items,
        alerts_recorded,
        server_time: Utc::now().timestamp(),
    }))
}

async fn persist_category(
    state: &AppState,
    agent_id: &str,
    category: Category,
    round: i64,
    records: &[InventoryRecord],
) -> Result<(), sqlx::Error> {
    let items: Vec<_> = records.iter().map(|r| r.to_new_item()).collect();
    CurrentItem::replace(&state.pool, agent_id, category, &items).await?;
    if category.has_history() && !items.is_empty() {
        HistoryItem::append(&state.pool, agent_id, category, round, &items).await?;
    }
    tracing::debug!(
        "Saved {} {} entries for agent {}",
        items.len(),
        category,
        agent_id
    );
    Ok(())
}

/// Agent heartbeat
pub async fn heartbeat(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> AppResult<Json<HeartbeatResponse>> {
    let status = req.status.as_deref().unwrap_or("online");
    let updated = Agent::update_heartbeat(&state.pool, &req.agent_id, status).await?;
    if !updated {
        return Err(AppError::NotFound(format!("Agent not found: {}", req.agent_id)));
    }

    Ok(Json(HeartbeatResponse {
        accepted: true,
        server_time: Utc::now().timestamp(),
    }))
}

pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<Agent>>> {
    Ok(Json(Agent::list(&state.pool).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> AppResult<Json<Agent>> {
    let agent = Agent::find_by_id(&state.pool, &agent_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Agent not found: {}", agent_id)))?;
    Ok(Json(agent))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let deleted = Agent::delete(&state.pool, &agent_id).await?;
    if !deleted {
        return Err(AppError::NotFound(format!("Agent not found: {}", agent_id)));
    }
    state.rounds.reset(&agent_id);
    tracing::info!("Agent deleted: {}", agent_id);
    Ok(Json(serde_json::json!({ "deleted": true })))
}
