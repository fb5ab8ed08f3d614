//! Site Orchestrator
//!
//! REST API for creating, deploying and inspecting hosted sites

use anyhow::{Context, Result};
use site_orchestrator::{
    create_router, AppState, DockerComposeEngine, MemorySiteStore, Orchestrator,
    OrchestratorConfig, RedisSiteStore, SiteStore,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "site_orchestrator=debug,topology_compiler=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = OrchestratorConfig::from_env().context("Failed to load configuration")?;

    info!("Starting Site Orchestrator");
    info!("Sites directory: {}", config.sites_path.display());
    info!("Proxy network: {}", config.compiler.network);
    info!("Compose command: {}", config.compose_command.join(" "));

    config.ensure_directories()?;

    let store: Arc<dyn SiteStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisSiteStore::new(url)
                .await
                .context("Failed to initialize Redis storage")?,
        ),
        None => {
            warn!("REDIS_URL not set, site descriptors are kept in memory only");
            Arc::new(MemorySiteStore::new())
        }
    };

    let engine = Arc::new(DockerComposeEngine::new(
        config.compose_command.clone(),
        config.docker_bin.clone(),
        config.engine_timeout,
    ));

    let state = AppState {
        orchestrator: Arc::new(Orchestrator::new(&config, engine, store)),
    };

    let app = create_router(state);

    let addr = config.api_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Site Orchestrator API running on http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
