use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{TonicExporterBuilder, WithExportConfig};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::Config;
use opentelemetry_sdk::{runtime, Resource};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use tracing_chrome::{ChromeLayerBuilder, FlushGuard};
use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Keeps the Chrome trace file open; dropping it flushes the trace.
pub struct TelemetryGuard {
    _chrome: Option<FlushGuard>,
}

pub struct TelemetryOptions {
    pub service_name: &'static str,
    pub otlp_endpoint: Option<String>,
    pub console: bool,
    pub chrome_trace: Option<PathBuf>,
}

pub fn init_telemetry(options: TelemetryOptions) -> Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("INFO"));

    let (chrome_layer, chrome_guard) = match &options.chrome_trace {
        Some(path) => {
            let (layer, guard) = ChromeLayerBuilder::new()
                .file(path)
                .include_args(true)
                .build();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let Some(endpoint) = options.otlp_endpoint else {
        Registry::default()
            .with(filter)
            .with(chrome_layer)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .context("Failed to install subscriber")?;
        return Ok(TelemetryGuard {
            _chrome: chrome_guard,
        });
    };

    let service_resource = Resource::new(vec![
        KeyValue::new(SERVICE_NAME, options.service_name),
        KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
    ]);

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(build_tonic_exporter(&endpoint))
        .with_trace_config(Config::default().with_resource(service_resource.clone()))
        .install_batch(runtime::Tokio)
        .context("Failed to install tracer")?
        .tracer(options.service_name);

    let meter = opentelemetry_otlp::new_pipeline()
        .metrics(runtime::Tokio)
        .with_exporter(build_tonic_exporter(&endpoint))
        .with_resource(service_resource)
        .build()
        .context("Failed to install meter")?;

    global::set_text_map_propagator(TraceContextPropagator::new());
    let console = options
        .console
        .then(|| tracing_subscriber::fmt::layer().boxed());
    Registry::default()
        .with(filter)
        .with(chrome_layer)
        .with(OpenTelemetryLayer::new(tracer))
        .with(MetricsLayer::new(meter))
        .with(console)
        .try_init()
        .context("Failed to install subscriber")?;

    Ok(TelemetryGuard {
        _chrome: chrome_guard,
    })
}

fn build_tonic_exporter(endpoint: &str) -> TonicExporterBuilder {
    opentelemetry_otlp::new_exporter()
        .tonic()
        .with_timeout(Duration::from_secs(15))
        .with_endpoint(endpoint)
}
