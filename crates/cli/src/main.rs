//! Nanoserve entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration** from flags and environment variables.
//! 2. **Wire observability**: `tracing-subscriber` with a JSON or text layer
//!    and, when configured, OpenTelemetry OTLP export of spans and metrics.
//!    All spans and events emitted by every crate flow through it.
//! 3. **Construct the object graph**: workflow registry (loaded from the
//!    workflows directory), node registry, python3 runtime bridge, workflow
//!    runner, metrics sink, and dispatcher. Nothing is global; each piece is
//!    passed to the next by `Arc`.
//! 4. **Record the cold start** on an `initialization` span and gauge.
//! 5. **Serve** until Ctrl+C or SIGTERM.

mod config;
mod telemetry;
mod workflows;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use axum::Router;
use clap::Parser;
use listener::{Dispatcher, OtelMetricsSink};
use nodes::{HttpRuntimeBridge, NodeRegistry, WorkflowRunner};
use pipeline::WorkflowRegistry;
use tokio::net::TcpListener;
use tracing::field::Empty;
use tracing::Instrument;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let started = Instant::now();
    let config = Config::parse();
    let telemetry = telemetry::init(&config)?;

    let result = run(config, started).await;
    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "nanoserve failed");
    }
    telemetry.shutdown();
    result
}

async fn run(config: Config, started: Instant) -> anyhow::Result<()> {
    let span = tracing::info_span!(
        "initialization",
        project = %config.project_name,
        version = %config.project_version,
        env = %config.environment,
        cold_start_ms = Empty,
    );
    let (app, socket, metrics) = initialize(&config).instrument(span.clone()).await?;

    let cold_start_ms = started.elapsed().as_secs_f64() * 1000.0;
    span.record("cold_start_ms", cold_start_ms);
    metrics.record_initialization(cold_start_ms, &config.environment);
    span.in_scope(|| {
        tracing::info!(
            address = %config.listen_addr(),
            cold_start_ms,
            "nanoserve listening"
        )
    });
    drop(span);

    listener::serve(socket, app, listener::shutdown_signal()).await?;
    Ok(())
}

/// Builds the object graph and binds the listening socket.
async fn initialize(config: &Config) -> anyhow::Result<(Router, TcpListener, OtelMetricsSink)> {
    let mut registry = WorkflowRegistry::new();
    if let Some(dir) = &config.workflows_dir {
        let loaded = workflows::load_dir(dir, &mut registry)?;
        tracing::info!(count = loaded, dir = %dir.display(), "workflows loaded");
    }
    let registry = Arc::new(registry);

    let nodes = Arc::new(NodeRegistry::with_builtins());
    tracing::info!(nodes = ?nodes.names(), "node registry ready");

    let mut runner = WorkflowRunner::new(nodes);
    if let Some(url) = &config.python3_runtime_url {
        let bridge = HttpRuntimeBridge::new(url.clone()).context("configuring python3 runtime")?;
        tracing::info!(endpoint = %bridge.endpoint(), "python3 runtime configured");
        runner = runner.with_python3(Arc::new(bridge));
    }

    let metrics = OtelMetricsSink::new("nanoserve");
    let dispatcher = Dispatcher::new(
        registry,
        Arc::new(runner),
        Arc::new(metrics.clone()),
        config.environment.clone(),
    );
    if let Some(dir) = &config.public_dir {
        tracing::info!(dir = %dir.display(), "serving static files");
    }
    let app = listener::router(
        Arc::new(dispatcher),
        config.body_limit_bytes(),
        config.public_dir.as_deref(),
    );

    let socket = listener::bind(config.listen_addr()).await?;
    Ok((app, socket, metrics))
}
