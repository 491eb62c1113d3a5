//! Backup administration HTTP routes.
//!
//! Provides endpoints for:
//! - Scheduler status and control (start, stop, restart, manual backup)
//! - Mail transport self-check
//! - Per-collection record counts

use std::collections::BTreeMap;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::background_jobs::JobError;
use crate::record_store::Collection;
use crate::server::state::{GuardedBackupScheduler, GuardedRecordStore, ServerState};

#[derive(Debug, Deserialize)]
pub struct ControlBody {
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
    ManualBackup,
}

impl ControlAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "restart" => Some(Self::Restart),
            "manual-backup" => Some(Self::ManualBackup),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// GET /status
async fn get_status(State(scheduler): State<GuardedBackupScheduler>) -> impl IntoResponse {
    Json(scheduler.status().await)
}

/// POST /control
async fn post_control(
    State(scheduler): State<GuardedBackupScheduler>,
    Json(body): Json<ControlBody>,
) -> Response {
    let Some(action) = ControlAction::parse(&body.action) else {
        warn!("Rejected unknown backup control action '{}'", body.action);
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Unknown action '{}'", body.action),
        );
    };
    info!("Backup control action: {:?}", action);

    match action {
        ControlAction::Start => {
            scheduler.start().await;
        }
        ControlAction::Stop => {
            scheduler.stop().await;
        }
        ControlAction::Restart => {
            scheduler.restart().await;
        }
        ControlAction::ManualBackup => {
            return match scheduler.trigger_manual().await {
                Ok(report) => Json(report.summary()).into_response(),
                Err(e @ JobError::AlreadyRunning) => {
                    error_response(StatusCode::CONFLICT, e.to_string())
                }
                Err(e) => {
                    error!("Manual backup failed: {}", e);
                    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                }
            };
        }
    }

    Json(scheduler.status().await).into_response()
}

/// GET /probe-transport
async fn get_probe_transport(State(scheduler): State<GuardedBackupScheduler>) -> Response {
    let result =
        tokio::task::spawn_blocking(move || scheduler.pipeline().notifier().send_probe()).await;
    match result {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => {
            error!("Transport probe task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Transport probe failed")
        }
    }
}

/// GET /collection-counts
async fn get_collection_counts(State(store): State<GuardedRecordStore>) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        Collection::ALL
            .iter()
            .map(|c| -> anyhow::Result<(&'static str, usize)> {
                Ok((c.name(), store.count(*c)?))
            })
            .collect::<anyhow::Result<BTreeMap<_, _>>>()
    })
    .await;

    match result {
        Ok(Ok(counts)) => Json(counts).into_response(),
        Ok(Err(e)) => {
            warn!("Failed to count collections: {:#}", e);
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Data layer unavailable: {:#}", e),
            )
        }
        Err(e) => {
            error!("Collection count task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Collection count failed")
        }
    }
}

pub fn make_backup_routes(state: ServerState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/control", post(post_control))
        .route("/probe-transport", get(get_probe_transport))
        .route("/collection-counts", get(get_collection_counts))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_action() {
        assert_eq!(ControlAction::parse("start"), Some(ControlAction::Start));
        assert_eq!(ControlAction::parse("stop"), Some(ControlAction::Stop));
        assert_eq!(ControlAction::parse("restart"), Some(ControlAction::Restart));
        assert_eq!(
            ControlAction::parse("manual-backup"),
            Some(ControlAction::ManualBackup)
        );
        assert_eq!(ControlAction::parse("Start"), None);
        assert_eq!(ControlAction::parse("delete-everything"), None);
    }
}
