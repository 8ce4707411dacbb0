//! Admin HTTP Routes
//!
//! Read-only status views plus the lifecycle actions, keyed by destination.
//! Actions may block (release waits out its grace period) and run on the
//! blocking pool.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::config::{ConfigError, InstanceConfig, InstanceMode};
use crate::controller::{ControlHandle, DestinationStatus};
use crate::election::ElectionErrorKind;
use crate::lifecycle::{ActionError, ActionResult, LifecycleActions};
use crate::monitor::MonitorView;
use crate::pipeline::PipelineError;

// ==================
// Response Types
// ==================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub address: String,
    pub destinations: usize,
    pub active: usize,
}

#[derive(Debug, Serialize)]
pub struct DestinationsResponse {
    pub destinations: Vec<DestinationStatus>,
    pub configs: BTreeMap<String, InstanceConfig>,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub destination: String,
    pub action: &'static str,
    /// Set by release: whether a peer took over
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_took_over: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: status.as_u16(),
        }),
    )
}

fn status_for(error: &ActionError) -> StatusCode {
    match error {
        ActionError::Config(ConfigError::Invalid(_) | ConfigError::UnsupportedMode { .. }) => {
            StatusCode::BAD_REQUEST
        }
        ActionError::Pipeline(PipelineError::UnknownDestination(_)) => StatusCode::NOT_FOUND,
        ActionError::Election(e) if e.kind == ElectionErrorKind::NotActive => StatusCode::CONFLICT,
        ActionError::ControllerStopped => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ==================
// Admin Routes
// ==================

/// Create admin routes
pub fn admin_routes(handle: ControlHandle) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/destinations", get(list_destinations_handler))
        .route("/destinations/:destination", get(get_destination_handler))
        .route("/monitors", get(list_monitors_handler))
        .route("/destinations/:destination/start", post(start_handler))
        .route("/destinations/:destination/stop", post(stop_handler))
        .route("/destinations/:destination/reload", post(reload_handler))
        .route("/destinations/:destination/release", post(release_handler))
        .route("/destinations/:destination/demand", post(demand_handler))
        .with_state(handle)
}

// ==================
// Status Handlers
// ==================

async fn health_handler(State(handle): State<ControlHandle>) -> Json<HealthResponse> {
    let statuses = handle.destination_statuses();
    Json(HealthResponse {
        status: if handle.is_stopped() { "stopped" } else { "ok" },
        address: handle.address().to_string(),
        destinations: statuses.len(),
        active: statuses.iter().filter(|s| s.active).count(),
    })
}

async fn list_destinations_handler(
    State(handle): State<ControlHandle>,
) -> Json<DestinationsResponse> {
    Json(DestinationsResponse {
        destinations: handle.destination_statuses(),
        configs: handle.instance_configs(),
    })
}

async fn get_destination_handler(
    State(handle): State<ControlHandle>,
    Path(destination): Path<String>,
) -> Result<Json<DestinationStatus>, ApiError> {
    handle
        .destination_status(&destination)
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("unknown destination: {}", destination),
            )
        })
}

async fn list_monitors_handler(
    State(handle): State<ControlHandle>,
) -> Json<BTreeMap<InstanceMode, MonitorView>> {
    Json(handle.monitor_views())
}

// ==================
// Action Handlers
// ==================

async fn run_action<F>(
    handle: ControlHandle,
    destination: String,
    action: &'static str,
    f: F,
) -> Result<Json<ActionResponse>, ApiError>
where
    F: FnOnce(&ControlHandle, &str) -> ActionResult<Option<bool>> + Send + 'static,
{
    let target = destination.clone();
    let outcome = tokio::task::spawn_blocking(move || f(&handle, target.as_str()))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    match outcome {
        Ok(peer_took_over) => Ok(Json(ActionResponse {
            destination,
            action,
            peer_took_over,
        })),
        Err(e) => Err(api_error(status_for(&e), e.to_string())),
    }
}

async fn start_handler(
    State(handle): State<ControlHandle>,
    Path(destination): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    run_action(handle, destination, "start", |handle, d| {
        handle.actions().start(d).map(|_| None)
    })
    .await
}

async fn stop_handler(
    State(handle): State<ControlHandle>,
    Path(destination): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    run_action(handle, destination, "stop", |handle, d| {
        handle.actions().stop(d).map(|_| None)
    })
    .await
}

async fn reload_handler(
    State(handle): State<ControlHandle>,
    Path(destination): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    run_action(handle, destination, "reload", |handle, d| {
        handle.actions().reload(d).map(|_| None)
    })
    .await
}

async fn release_handler(
    State(handle): State<ControlHandle>,
    Path(destination): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    run_action(handle, destination, "release", |handle, d| {
        handle.actions().release_to_peer(d).map(Some)
    })
    .await
}

async fn demand_handler(
    State(handle): State<ControlHandle>,
    Path(destination): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    run_action(handle, destination, "demand", |handle, d| {
        handle.actions().demand(d).map(|_| None)
    })
    .await
}
