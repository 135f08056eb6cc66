//! Error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Requested agent/config/snapshot does not exist.
    #[error("{0}")]
    NotFound(String),

    /// No baseline snapshot exists for the host+category. Callers must be
    /// able to tell this apart from a comparison with zero anomalies.
    #[error("no baseline snapshot for agent {agent_id} category {category}")]
    NoBaseline { agent_id: String, category: String },

    #[error("{0}")]
    ValidationError(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::NoBaseline { agent_id, category } => (
                StatusCode::NOT_FOUND,
                format!("no baseline for agent {} category {}", agent_id, category),
            ),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error occurred".to_string())
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        // NoBaseline carries a machine-readable marker so clients never
        // confuse it with an empty anomaly list.
        let body = match &self {
            AppError::NoBaseline { .. } => Json(json!({
                "error": error_message,
                "no_baseline": true,
                "status": status.as_u16()
            })),
            _ => Json(json!({
                "error": error_message,
                "status": status.as_u16()
            })),
        };

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    use crate::baseline::compare::diff;
    use crate::baseline::Category;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn no_baseline_is_distinguishable_from_zero_anomalies() {
        let (status, body) = body_json(AppError::NoBaseline {
            agent_id: "h1".to_string(),
            category: "PORT".to_string(),
        })
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["no_baseline"], serde_json::json!(true));

        // A comparison that found nothing serializes without the marker.
        let empty = diff(Category::Port, &[], &[]);
        assert!(!empty.has_anomalies());
        let serialized = serde_json::to_value(&empty).unwrap();
        assert!(serialized.get("no_baseline").is_none());
        assert_eq!(serialized["new_items_count"], serde_json::json!(0));
    }

    #[tokio::test]
    async fn plain_not_found_carries_no_baseline_marker() {
        let (status, body) = body_json(AppError::NotFound("Agent not found: h1".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.get("no_baseline").is_none());
    }

    #[tokio::test]
    async fn validation_errors_map_to_bad_request() {
        let (status, body) = body_json(AppError::ValidationError("unknown category: DISK".to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], serde_json::json!("unknown category: DISK"));
    }
}
