//! Main entry point for the style-transfer worker

use std::sync::Arc;
use std::time::Duration;

use stylize_worker::{
    api,
    config::Settings,
    engine::{orchestrator::Orchestrator, sidecar::SidecarRuntime, EngineRuntime},
    pipeline::{GenerationWorker, ImageFetcher},
    resource::{resolver::Resolver, ResourceTable},
    AppState,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::load()?;
    settings.validate()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.clone()));
    if settings.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    info!("Starting style-transfer worker");
    info!(
        host = %settings.server.host,
        port = settings.server.port,
        "Loaded configuration"
    );

    // Static resource location table, built once
    let table = Arc::new(ResourceTable::from_config(&settings.resources));
    let resolver = Arc::new(Resolver::new(
        settings.resources.cache_dir.clone(),
        Duration::from_secs(settings.timeouts.download_secs),
    )?);

    // Accelerator collaborator
    let runtime: Arc<dyn EngineRuntime> = Arc::new(SidecarRuntime::new(
        settings.engine.sidecar_url.clone(),
        Duration::from_secs(settings.timeouts.processing_secs),
    )?);

    // The worker task takes sole ownership of engine and modifier state
    let orchestrator = Orchestrator::new(
        runtime.clone(),
        resolver,
        table,
        settings.engine.clone(),
    );
    let worker = GenerationWorker::spawn(
        orchestrator,
        Duration::from_secs(settings.timeouts.processing_secs),
    );

    let fetcher = ImageFetcher::new(
        settings.limits.clone(),
        settings.storage.clone(),
        Duration::from_secs(settings.timeouts.download_secs),
        Duration::from_secs(settings.timeouts.upload_secs),
    )?;

    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    let app_state = Arc::new(AppState {
        settings,
        runtime,
        fetcher,
        worker,
    });

    let app = api::routes::create_router(app_state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
