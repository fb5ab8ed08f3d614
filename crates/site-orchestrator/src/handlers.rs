//! API handlers for the site orchestrator

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ddeployer_common::{DeploymentRecord, Error, SiteFilter};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    models::{CreateSiteRequest, DeleteReport, SiteView, StatusReport, UpdateSiteRequest},
    orchestrator::{Orchestrator, DEFAULT_LOG_TAIL},
};

/// Shared application state
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            e if e.is_rejection() => StatusCode::UNPROCESSABLE_ENTITY,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::Engine { .. } | Error::Probe(_) => StatusCode::BAD_GATEWAY,
            Error::EngineTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", err);
        }

        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

/// Query parameters for the logs endpoint
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub tail: Option<usize>,
}

/// Health check
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "site-orchestrator"
    }))
}

/// List sites, optionally filtered by status and type
pub async fn list_sites_handler(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<SiteFilter>,
) -> Result<Json<Vec<SiteView>>, ApiError> {
    let sites = state.orchestrator.list(&filter).await?;
    Ok(Json(sites.iter().map(SiteView::from).collect()))
}

/// Create and deploy a site
pub async fn create_site_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSiteRequest>,
) -> Result<(StatusCode, Json<SiteView>), ApiError> {
    info!("Create site request: {}", payload.name);

    let site = state.orchestrator.create(payload).await?;
    Ok((StatusCode::CREATED, Json(SiteView::from(&site))))
}

/// Get one site
pub async fn get_site_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<SiteView>, ApiError> {
    let site = state.orchestrator.get(id).await?;
    Ok(Json(SiteView::from(&site)))
}

/// Update a site and redeploy it
pub async fn update_site_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(payload): Json<UpdateSiteRequest>,
) -> Result<Json<SiteView>, ApiError> {
    info!("Update site request: {}", id);

    let site = state.orchestrator.update(id, payload).await?;
    Ok(Json(SiteView::from(&site)))
}

/// Delete a site
pub async fn delete_site_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<DeleteReport>, ApiError> {
    info!("Delete site request: {}", id);

    let report = state.orchestrator.delete(id).await?;
    Ok(Json(report))
}

/// Redeploy a site from its stored descriptor
pub async fn start_site_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<SiteView>, ApiError> {
    let site = state.orchestrator.start(id).await?;
    Ok(Json(SiteView::from(&site)))
}

/// Stop a running site, keeping its volumes
pub async fn stop_site_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<SiteView>, ApiError> {
    let site = state.orchestrator.stop(id).await?;
    Ok(Json(SiteView::from(&site)))
}

/// Recorded status next to the live container state
pub async fn site_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<StatusReport>, ApiError> {
    let report = state.orchestrator.status(id).await?;
    Ok(Json(report))
}

/// Recent app container output, `tail` lines (default 100)
pub async fn site_logs_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tail = query.tail.unwrap_or(DEFAULT_LOG_TAIL);
    let logs = state.orchestrator.logs(id, tail).await?;

    Ok(Json(serde_json::json!({
        "site_id": id,
        "logs": logs
    })))
}

/// Deployment history, newest first
pub async fn site_deployments_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<DeploymentRecord>>, ApiError> {
    let records = state.orchestrator.deployments(id).await?;
    Ok(Json(records))
}
