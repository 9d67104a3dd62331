// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Live ingestion for the os monitor: seeds every series from the historical store, then fans the
//! per-metric live feeds into the registry until stopped.

pub mod bootstrap;
pub mod decode;
pub mod export;
pub mod metrics;
pub mod router;

pub use bootstrap::{BootstrapReport, Bootstrapper, HistoricalFetchError, SeedTarget};
pub use decode::{DecodeError, decode_reading};
pub use export::{ExportQueue, spawn_exporter};
pub use metrics::{IngestMetrics, IngestMetricsSnapshot};
pub use router::{IngestionRouter, RouterConfig, RouterExit};

use std::{sync::Arc, time::Duration};

use core_types::{MetricId, MonitorConfig, retry::RetryPolicy};
use engine_api::{Engine, EngineError, EngineHealth, EngineResult, HealthStatus};
use futures::future::join_all;
use log::{error, info, warn};
use parking_lot::Mutex;
use series_store::{SeriesError, SeriesRegistry};
use store_client::{ExportSink, HistoricalStore, LiveSource};
use thiserror::Error;
use tokio::{runtime::Runtime, sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

const LABEL: &str = "ingest";

/// Knobs the engine takes from [`MonitorConfig`].
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub targets: Vec<SeedTarget>,
    pub history_points: usize,
    pub fetch_attempts: usize,
    pub router: RouterConfig,
    pub channel_capacity: usize,
    pub export_metric: Option<MetricId>,
    pub export_queue: usize,
}

impl IngestSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            targets: config
                .metrics
                .iter()
                .map(|m| SeedTarget {
                    metric: m.metric_id(),
                    datasource: m.datasource().to_string(),
                })
                .collect(),
            history_points: config.series.history_points,
            fetch_attempts: config.store.fetch_attempts,
            router: RouterConfig {
                idle_backoff: config.idle_backoff(),
                drain_budget: config.ingest.drain_budget,
            },
            channel_capacity: config.ingest.channel_capacity.max(1),
            export_metric: config.export_metric(),
            export_queue: config.export.queue_capacity,
        }
    }
}

/// External collaborators the engine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn HistoricalStore>,
    pub live: Arc<dyn LiveSource>,
    pub export: Option<Arc<dyn ExportSink>>,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no live source could be reached at startup")]
    NoLiveSource,
    #[error("historical store unreachable for every metric")]
    StoreUnreachable,
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Series(#[from] SeriesError),
}

impl From<IngestError> for EngineError {
    fn from(value: IngestError) -> Self {
        EngineError::failure(value)
    }
}

pub struct IngestEngine {
    inner: Arc<IngestInner>,
}

impl IngestEngine {
    pub fn new(
        settings: IngestSettings,
        registry: Arc<SeriesRegistry>,
        collaborators: Collaborators,
        metrics: IngestMetrics,
    ) -> Self {
        Self {
            inner: Arc::new(IngestInner {
                settings,
                registry,
                collaborators,
                metrics,
                state: Mutex::new(EngineRuntimeState::Stopped),
                health: Arc::new(Mutex::new(EngineHealth::default())),
            }),
        }
    }

    pub fn metrics(&self) -> &IngestMetrics {
        &self.inner.metrics
    }
}

impl Engine for IngestEngine {
    fn label(&self) -> &str {
        LABEL
    }

    fn start(&self) -> EngineResult<()> {
        self.inner.start()
    }

    fn stop(&self) -> EngineResult<()> {
        self.inner.stop()
    }

    fn health(&self) -> EngineHealth {
        self.inner.health.lock().clone()
    }
}

struct IngestInner {
    settings: IngestSettings,
    registry: Arc<SeriesRegistry>,
    collaborators: Collaborators,
    metrics: IngestMetrics,
    state: Mutex<EngineRuntimeState>,
    health: Arc<Mutex<EngineHealth>>,
}

impl IngestInner {
    fn start(&self) -> EngineResult<()> {
        let mut guard = self.state.lock();
        if matches!(*guard, EngineRuntimeState::Running(_)) {
            return Err(EngineError::AlreadyRunning);
        }
        set_health(&self.health, HealthStatus::Starting, None);
        let runtime = Runtime::new().map_err(IngestError::from)?;
        let cancel = CancellationToken::new();
        match runtime.block_on(self.launch(cancel.clone())) {
            Ok((router, mut tasks)) => {
                let health = Arc::clone(&self.health);
                let router_cancel = cancel.clone();
                tasks.push(runtime.spawn(async move {
                    match router.run(router_cancel).await {
                        RouterExit::Cancelled => {
                            info!("[{LABEL}] router stopped");
                        }
                        RouterExit::SourcesClosed => {
                            set_health(
                                &health,
                                HealthStatus::Degraded,
                                Some("all live sources closed".to_string()),
                            );
                        }
                    }
                }));
                *guard = EngineRuntimeState::Running(RuntimeBundle {
                    runtime,
                    tasks,
                    cancel,
                });
                Ok(())
            }
            Err(err) => {
                cancel.cancel();
                set_health(&self.health, HealthStatus::Failed, Some(err.to_string()));
                error!("[{LABEL}] startup failed: {err}");
                Err(err.into())
            }
        }
    }

    /// Opens the live feeds, seeds history, and wires the router. Live payloads that arrive while
    /// seeding wait in their channels, so every series sees its history before any live point.
    async fn launch(
        &self,
        cancel: CancellationToken,
    ) -> Result<(IngestionRouter, Vec<JoinHandle<()>>), IngestError> {
        let settings = &self.settings;
        let mut router = IngestionRouter::new(settings.router, self.metrics.clone());
        let mut opens = Vec::with_capacity(settings.targets.len());
        for target in &settings.targets {
            let (tx, rx) = mpsc::channel(settings.channel_capacity);
            router.add_source(&self.registry, &target.metric, rx)?;
            opens.push(self.collaborators.live.open(
                target.metric.clone(),
                target.datasource.clone(),
                tx,
                cancel.child_token(),
            ));
        }
        let handles = join_all(opens).await;
        let connected = handles.iter().filter(|handle| handle.connected).count();
        let mut tasks: Vec<JoinHandle<()>> = handles.into_iter().map(|handle| handle.task).collect();
        if connected == 0 && !settings.targets.is_empty() {
            for task in &tasks {
                task.abort();
            }
            return Err(IngestError::NoLiveSource);
        }

        let report = Bootstrapper::new(Arc::clone(&self.collaborators.store), settings.history_points)
            .with_retry(RetryPolicy::store_fetch(settings.fetch_attempts))
            .seed(&self.registry, &settings.targets)
            .await;
        if report.store_unreachable() {
            for task in &tasks {
                task.abort();
            }
            return Err(IngestError::StoreUnreachable);
        }

        let degraded = connected < settings.targets.len() || !report.failed.is_empty();
        if let (Some(metric), Some(sink)) = (&settings.export_metric, &self.collaborators.export) {
            let (queue, worker) = spawn_exporter(
                Arc::clone(sink),
                settings.export_queue,
                self.metrics.clone(),
                cancel.child_token(),
            );
            router = router.with_export(metric, queue);
            tasks.push(worker);
            info!("[{LABEL}] exporting raw '{metric}' payloads");
        }
        if degraded {
            let detail = format!(
                "{connected}/{} live sources connected, {} metrics without history",
                settings.targets.len(),
                report.failed.len()
            );
            warn!("[{LABEL}] starting degraded: {detail}");
            set_health(&self.health, HealthStatus::Degraded, Some(detail));
        } else {
            set_health(&self.health, HealthStatus::Ready, None);
        }
        Ok((router, tasks))
    }

    fn stop(&self) -> EngineResult<()> {
        let mut guard = self.state.lock();
        let Some(bundle) = guard.take_running() else {
            return Err(EngineError::NotRunning);
        };
        bundle.cancel.cancel();
        RuntimeBundle::join(bundle);
        *guard = EngineRuntimeState::Stopped;
        set_health(&self.health, HealthStatus::Stopped, None);
        info!("[{LABEL}] engine stopped");
        Ok(())
    }
}

fn set_health(health: &Mutex<EngineHealth>, status: HealthStatus, detail: Option<String>) {
    let mut guard = health.lock();
    guard.status = status;
    guard.detail = detail;
}

enum EngineRuntimeState {
    Stopped,
    Running(RuntimeBundle),
}

impl EngineRuntimeState {
    fn take_running(&mut self) -> Option<RuntimeBundle> {
        match std::mem::replace(self, EngineRuntimeState::Stopped) {
            EngineRuntimeState::Running(bundle) => Some(bundle),
            EngineRuntimeState::Stopped => None,
        }
    }
}

struct RuntimeBundle {
    runtime: Runtime,
    tasks: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl RuntimeBundle {
    const JOIN_GRACE: Duration = Duration::from_secs(5);

    fn join(bundle: RuntimeBundle) {
        let RuntimeBundle {
            runtime,
            tasks,
            cancel: _,
        } = bundle;
        runtime.block_on(async {
            for task in tasks {
                match tokio::time::timeout(Self::JOIN_GRACE, task).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) if err.is_cancelled() => {}
                    Ok(Err(err)) => error!("[{LABEL}] task join failed: {err}"),
                    Err(_) => warn!("[{LABEL}] task did not stop within {:?}", Self::JOIN_GRACE),
                }
            }
        });
        runtime.shutdown_timeout(Self::JOIN_GRACE);
    }
}
