//! Tracing subscriber and OpenTelemetry wiring.
//!
//! Always installs an `EnvFilter` (`RUST_LOG`, default `info`) and a fmt
//! layer. With an OTLP endpoint it also exports spans through
//! `tracing-opentelemetry` and installs a global meter provider, which backs
//! the `workflow_errors` counter.

use anyhow::Context as _;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, LogFormat};

/// Providers to flush on shutdown.
#[derive(Default)]
pub struct TelemetryGuard {
    tracer_provider: Option<TracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl TelemetryGuard {
    pub fn shutdown(self) {
        if let Some(provider) = self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "failed to flush spans");
            }
        }
        if let Some(provider) = self.meter_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "failed to flush metrics");
            }
        }
    }
}

fn resource(config: &Config) -> Resource {
    Resource::new([
        KeyValue::new("service.name", config.project_name.clone()),
        KeyValue::new("service.version", config.project_version.clone()),
        KeyValue::new("deployment.environment", config.environment.clone()),
    ])
}

pub fn init(config: &Config) -> anyhow::Result<TelemetryGuard> {
    let mut guard = TelemetryGuard::default();

    let otel_layer = match &config.otlp_endpoint {
        Some(endpoint) => {
            let spans = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint.clone())
                .build()
                .context("building OTLP span exporter")?;
            let tracer_provider = TracerProvider::builder()
                .with_batch_exporter(spans, runtime::Tokio)
                .with_resource(resource(config))
                .build();
            let tracer = tracer_provider.tracer("nanoserve");
            global::set_tracer_provider(tracer_provider.clone());

            let metrics = opentelemetry_otlp::MetricExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint.clone())
                .build()
                .context("building OTLP metric exporter")?;
            let meter_provider = SdkMeterProvider::builder()
                .with_reader(PeriodicReader::builder(metrics, runtime::Tokio).build())
                .with_resource(resource(config))
                .build();
            global::set_meter_provider(meter_provider.clone());

            guard.tracer_provider = Some(tracer_provider);
            guard.meter_provider = Some(meter_provider);
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter).with(otel_layer);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    }
    .context("installing tracing subscriber")?;

    Ok(guard)
}
