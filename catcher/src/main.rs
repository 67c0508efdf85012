use std::time::Duration;

use anyhow::Context;
use envconfig::Envconfig;
use opentelemetry::trace::TraceError;
use opentelemetry::{KeyValue, Value};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{BatchConfig, RandomIdGenerator, Sampler, Tracer};
use opentelemetry_sdk::{runtime, Resource};
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use catcher::config::Config;
use catcher::server::serve;

/// Resolves on SIGTERM (Kubernetes pod stop) or SIGINT, which starts the graceful drain.
async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    tokio::select! {
        _ = term.recv() => tracing::info!("received SIGTERM, draining webhook requests"),
        interrupted = signal::ctrl_c() => match interrupted {
            Ok(()) => tracing::info!("received SIGINT, draining webhook requests"),
            Err(err) => tracing::error!("failed to listen for SIGINT, shutting down: {}", err),
        },
    };
}

fn init_tracer(sink_url: &str, sampling_rate: f64, service_name: &str) -> Result<Tracer, TraceError> {
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_trace_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                    sampling_rate,
                ))))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![KeyValue::new(
                    "service.name",
                    Value::from(service_name.to_string()),
                )])),
        )
        .with_batch_config(BatchConfig::default())
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(sink_url)
                .with_timeout(Duration::from_secs(3)),
        )
        .install_batch(runtime::Tokio)
}

/// Stdout logs default to `LOG_LEVEL` and can be narrowed per target with `RUST_LOG`.
/// Spans go to the OTLP collector too when `OTEL_URL` is set.
fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let level = LevelFilter::from_level(config.log_level);
    let log_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy(),
    );

    let otel_layer = match config.otel_url.as_deref() {
        Some(url) => Some(OpenTelemetryLayer::new(init_tracer(
            url,
            config.otel_sampling_rate,
            &config.otel_service_name,
        )?)),
        None => None,
    };

    tracing_subscriber::registry()
        .with(log_layer)
        .with(otel_layer.with_filter(level))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init_from_env().context("invalid configuration")?;
    init_tracing(&config)?;

    let listener = tokio::net::TcpListener::bind(config.address)
        .await
        .with_context(|| format!("could not bind {}", config.address))?;
    serve(config, listener, shutdown()).await
}
