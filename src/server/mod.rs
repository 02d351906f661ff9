use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use candle_core::Device;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::inference::device::{device_kind, select_device};
use crate::inference::loader::{load_model, LoadStrategy, ModelSource};
use crate::server::state::{AppState, ModelSlot};

pub mod analyze;
pub mod health;
pub mod score;
pub mod state;

// Base64 inflates images by a third, 20 MB leaves room for large photos
const ANALYZE_BODY_LIMIT: usize = 20_000_000;

/// Routes of the analyze service.
pub fn analyze_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::handle_health))
        .route("/analyze", post(analyze::handle_analyze))
        .layer(DefaultBodyLimit::max(ANALYZE_BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Routes of the score service.
pub fn score_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::handle_health))
        .route("/score", post(score::handle_score))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Loads the model in the background and serves `router` meanwhile.
pub async fn run_service(
    config: &Config,
    strategy: LoadStrategy,
    router: fn(Arc<AppState>) -> Router,
) -> Result<()> {
    let device = select_device(config.cpu);
    let slot = ModelSlot::default();
    let state = Arc::new(AppState::new(config, device_kind(&device), slot.clone()));

    spawn_model_load(slot, ModelSource::from(config), device, strategy);
    serve(router(state), config).await
}

pub fn spawn_model_load(
    slot: ModelSlot,
    source: ModelSource,
    device: Device,
    strategy: LoadStrategy,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let result = load_model(&source, &device, strategy);
        match &result {
            Ok(_) => info!("Server ready with {} loaded", source.model_name),
            Err(err) => error!("Failed to load model on startup: {:#}", err),
        }
        slot.finish(result);
    })
}

pub async fn serve(router: Router, config: &Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.address, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.address, config.port))?;

    match config.tls_files() {
        Some((cert, key)) => {
            let tls = RustlsConfig::from_pem_file(&cert, &key)
                .await
                .context("Failed to load TLS certificate")?;
            let handle = Handle::new();
            tokio::spawn(shutdown_handle(handle.clone()));

            info!("Listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(router.into_make_service())
                .await?;
        }
        None => {
            let listener = TcpListener::bind(addr).await?;
            info!("Listening on http://{}", listener.local_addr()?);
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }
    Ok(())
}

async fn shutdown_handle(handle: Handle) {
    shutdown_signal().await;
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}

// TODO abort in-flight generation on shutdown, spawn_blocking tasks currently run to completion
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down..."),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}
