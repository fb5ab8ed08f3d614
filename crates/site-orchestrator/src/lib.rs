//! Site Orchestrator
//!
//! Turns site descriptors into running container stacks behind the shared
//! reverse proxy, and exposes their lifecycle over a small REST API.

pub mod config;
pub mod engine;
pub mod handlers;
pub mod locks;
pub mod models;
pub mod orchestrator;
pub mod prober;
pub mod storage;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::OrchestratorConfig;
pub use engine::{ContainerEngine, DockerComposeEngine, EngineOutput};
pub use handlers::AppState;
pub use locks::{SiteGuard, SiteLocks};
pub use models::{CreateSiteRequest, DeleteReport, StatusReport, UpdateSiteRequest};
pub use orchestrator::Orchestrator;
pub use prober::{StatusProber, StatusSnapshot};
pub use storage::{MemorySiteStore, RedisSiteStore, SiteStore};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/api/sites",
            get(handlers::list_sites_handler).post(handlers::create_site_handler),
        )
        .route(
            "/api/sites/{id}",
            get(handlers::get_site_handler)
                .put(handlers::update_site_handler)
                .delete(handlers::delete_site_handler),
        )
        .route("/api/sites/{id}/start", post(handlers::start_site_handler))
        .route("/api/sites/{id}/stop", post(handlers::stop_site_handler))
        .route("/api/sites/{id}/status", get(handlers::site_status_handler))
        .route("/api/sites/{id}/logs", get(handlers::site_logs_handler))
        .route(
            "/api/sites/{id}/deployments",
            get(handlers::site_deployments_handler),
        )
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
