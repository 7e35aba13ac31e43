use anyhow::Context;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use warp::Filter;

use ipo_analyzer::config::AppConfig;
use ipo_analyzer::offering_source;
use ipo_analyzer::routes;
use ipo_analyzer::services::query::QueryService;
use ipo_analyzer::services::scheduler::RefreshScheduler;
use ipo_analyzer::services::store::OfferingStore;
use ipo_analyzer::state::AppState;

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    _ = term.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                error!("Cannot listen for SIGTERM ({}), only Ctrl-C will stop the server", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl-C");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize the logger
    env_logger::init();
    info!("Logger initialized. Starting the application...");

    let config = AppConfig::from_env().context("invalid configuration")?;
    info!("Using PORT: {}", config.port);

    let store = Arc::new(OfferingStore::new());
    if let Some(path) = &config.snapshot_path {
        store
            .load_snapshot(path)
            .await
            .with_context(|| format!("failed to load snapshot {}", path.display()))?;
    }

    let source = offering_source(&config)?;
    let scheduler = Arc::new(
        RefreshScheduler::new(Arc::clone(&store), source, config.refresh.clone())
            .with_snapshot(config.snapshot_path.clone()),
    );
    let schedule = Arc::clone(&scheduler).start().await?;

    let query = QueryService::new(Arc::clone(&store), config.cache_ttl);
    let state = Arc::new(AppState::new(Arc::clone(&store), query).with_scheduler(scheduler));

    // Set up CORS
    let cors = warp::cors()
        .allow_any_origin()
        .allow_header("content-type")
        .allow_methods(vec!["GET", "POST"]);

    let api = routes::routes(state).with(cors).with(warp::log("ipo_analyzer::http"));
    info!("Routes configured successfully with CORS.");

    // Bind to 0.0.0.0 so the reverse proxy can reach us
    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let (bound, server) = warp::serve(api)
        .try_bind_with_graceful_shutdown(addr, shutdown_signal())
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("Starting server on {}", bound);
    server.await;

    info!("Server stopped, shutting down the refresh scheduler");
    schedule.shutdown().await?;

    if let Some(path) = &config.snapshot_path {
        if let Err(e) = store.save_snapshot(path).await {
            error!("Failed to write final snapshot: {}", e);
        }
    }
    info!("Shutdown complete");
    Ok(())
}
