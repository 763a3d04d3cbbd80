//! Liveness of the metadata store and the blob store

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn from_result<E: std::fmt::Display>(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self {
                status: HealthStatus::Healthy,
                error: None,
            },
            Err(e) => Self {
                status: HealthStatus::Unhealthy,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<ComponentHealth>,
    pub storage: ComponentHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_files: Option<i64>,
}

/// GET /health
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    info!("GET /health - Running health checks");

    let storage = ComponentHealth::from_result(state.file_manager.blobs().health_check().await);

    let (database, stored_files) = match &state.db_manager {
        Some(db_manager) => {
            let health = ComponentHealth::from_result(db_manager.health_check().await);
            let stored_files = match health.status {
                HealthStatus::Healthy => db_manager.get_stats().await.ok().map(|s| s.file_count),
                HealthStatus::Unhealthy => None,
            };
            (Some(health), stored_files)
        }
        None => (None, None),
    };

    let healthy = storage.status == HealthStatus::Healthy
        && database
            .as_ref()
            .map(|d| d.status == HealthStatus::Healthy)
            .unwrap_or(true);

    let report = HealthReport {
        status: if healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        },
        version: state.version.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        database,
        storage,
        stored_files,
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        warn!("Health check failed: {:?}", report);
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(report))
}
