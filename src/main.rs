//! Regret Guard - Main Entry Point
//!
//! Starts model loading in the background, selects a storage backend and
//! serves the HTTP API until Ctrl-C.

use anyhow::{Context, Result};
use regret_guard::{
    api,
    config::{AppConfig, LoggingConfig},
    metrics::{MetricsReporter, ServiceMetrics},
    models::{InferenceExecutor, ModelLoader, OnnxToxicityClassifier, SharedClassifier},
    service::RegretService,
    storage::{self, AnalysisWriter, StorageGateway},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("regret_guard={}", config.level).parse()?);

    if config.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("Starting Regret Guard");
    info!(
        bind = %config.server.bind,
        workers = config.inference.workers,
        default_threshold = config.scoring.default_threshold,
        "Configuration loaded successfully"
    );

    let metrics = Arc::new(ServiceMetrics::new());

    // The server accepts requests while the model is still loading
    let model_config = config.model.clone();
    let (loader, _load_handle) = ModelLoader::spawn(move || {
        let classifier = OnnxToxicityClassifier::load(&model_config)?;
        Ok(Arc::new(classifier) as SharedClassifier)
    });

    let store = storage::connect(&config.storage).await;
    info!(backend = ?store.backend(), "Storage backend selected");

    let (writer, writer_task) =
        AnalysisWriter::spawn(store.clone(), config.storage.write_queue_capacity, metrics.clone());

    let executor = InferenceExecutor::new(
        loader,
        config.inference.workers,
        config.model.max_input_chars,
        metrics.clone(),
    );
    info!(
        workers = executor.workers(),
        max_input_chars = config.model.max_input_chars,
        "Inference executor initialized"
    );
    let service = Arc::new(RegretService::new(
        executor,
        store,
        writer,
        metrics.clone(),
        config.scoring.default_threshold,
    ));

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("Listening on http://{}", config.server.bind);

    axum::serve(listener, api::router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Service shutting down...");
    writer_task.shutdown().await;
    metrics.print_summary();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
