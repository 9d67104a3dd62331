mod exporter;
mod logger;
mod server;

use std::{collections::HashMap, process, sync::Arc, sync::mpsc};

use core_types::{ConfigError, MonitorConfig};
use engine_api::{Engine, EngineError};
use ingest_engine::{Collaborators, IngestEngine, IngestMetrics, IngestSettings};
use log::{error, info, warn};
use series_store::{SeriesError, SeriesRegistry, SnapshotReader};
use server::{AppState, HttpServer, ServerError, missing_dashboard_metrics};
use store_client::{
    ExportError, ExportSink, HttpExportSink, HttpStoreClient, ObserveError, StoreError, WsObserver,
};
use thiserror::Error;

fn main() {
    logger::initialize_logger();
    if let Err(err) = run() {
        error!("os-monitor failed: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let config = MonitorConfig::load()?;
    let addr = config.http_addr()?;
    let registry = Arc::new(SeriesRegistry::new(
        config.series.capacity,
        config.metrics.iter().map(|m| m.metric_id()),
    )?);
    info!(
        "monitoring {} metrics with capacity {}; store {}, live {}",
        registry.len(),
        registry.capacity(),
        config.store.base_url,
        config.live.base_url
    );

    let missing = missing_dashboard_metrics(&registry);
    if !missing.is_empty() {
        warn!(
            "dashboard metrics not configured, their endpoints will answer 404: {}",
            missing.join(", ")
        );
    }

    let store = Arc::new(HttpStoreClient::new(
        &config.store.base_url,
        config.store_timeout(),
    )?);
    let export: Option<Arc<dyn ExportSink>> = match config.export_metric() {
        Some(_) => Some(Arc::new(HttpExportSink::new(
            config.export.url.clone(),
            config.store_timeout(),
        )?)),
        None => None,
    };
    let collaborators = Collaborators {
        store: store.clone(),
        live: Arc::new(
            WsObserver::new(&config.live.base_url)?
                .with_connect_timeout(config.live_connect_timeout()),
        ),
        export,
    };
    let ingest = IngestMetrics::new();
    let engine = Arc::new(IngestEngine::new(
        IngestSettings::from_config(&config),
        Arc::clone(&registry),
        collaborators,
        ingest.clone(),
    ));
    engine.start()?;
    log_engine_health(engine.as_ref());

    let state = Arc::new(AppState {
        reader: SnapshotReader::new(Arc::clone(&registry)),
        store,
        engine: engine.clone(),
        ingest,
        labels: config
            .metrics
            .iter()
            .map(|m| (m.metric_id(), m.label().to_string()))
            .collect::<HashMap<_, _>>(),
        datasources: config
            .metrics
            .iter()
            .map(|m| (m.metric_id(), m.datasource().to_string()))
            .collect::<HashMap<_, _>>(),
        stats_window_secs: config.stats.window_secs,
    });
    let server = match HttpServer::start(state, addr) {
        Ok(server) => server,
        Err(err) => {
            let _ = engine.stop();
            return Err(err.into());
        }
    };

    info!("os-monitor running; press Ctrl+C to shut down");
    let waited = wait_for_shutdown_signal();
    info!("shutting down");
    server.shutdown();
    engine.stop()?;
    waited
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error("historical store client: {0}")]
    Store(#[from] StoreError),
    #[error("live observer: {0}")]
    Observe(#[from] ObserveError),
    #[error("export sink: {0}")]
    Export(#[from] ExportError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("failed while waiting for shutdown signal: {0}")]
    ShutdownWait(#[from] mpsc::RecvError),
}

fn wait_for_shutdown_signal() -> Result<(), AppError> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    rx.recv()?;
    Ok(())
}

fn log_engine_health(engine: &dyn Engine) {
    let health = engine.health();
    info!(
        "{} status: {:?} ({})",
        engine.label(),
        health.status,
        health.detail.as_deref().unwrap_or("ok")
    );
}
