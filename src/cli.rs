use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use clap::Parser;
use tracing::info;

use crate::config::{Args, Config};
use crate::exit_err;
use crate::inference::loader::LoadStrategy;
use crate::server::run_service;
use crate::server::state::AppState;
use crate::telemetry::{init_telemetry, TelemetryOptions};

/// Shared entry point of the service binaries.
pub async fn launch(
    service_name: &'static str,
    strategy: LoadStrategy,
    router: fn(Arc<AppState>) -> Router,
) -> Result<()> {
    let mut args = Args::parse();
    let config = Config::load(&args.config_file, &mut args.opt_config);

    // Telemetry comes up first so a broken configuration file is still logged
    let telemetry_config = config.as_ref().ok();
    let _telemetry = init_telemetry(TelemetryOptions {
        service_name,
        otlp_endpoint: telemetry_config.and_then(Config::otlp_endpoint),
        console: telemetry_config.map_or(true, |c| c.console),
        chrome_trace: telemetry_config.and_then(Config::chrome_trace),
    })?;

    let config = match config {
        Ok(config) => config,
        Err(err) => exit_err!(1, "{:#}", err),
    };

    info!(
        "Starting {} for {} (strategy: {:?})",
        service_name, config.model_name, strategy
    );
    run_service(&config, strategy, router).await
}
