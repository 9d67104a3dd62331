// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! HTTP surface: status probe, dashboard, JSON series snapshots, windowed stats, and prometheus.

use std::{collections::HashMap, net::SocketAddr, sync::Arc, thread};

use core_types::{AggregateFn, MetricId, now_millis};
use engine_api::Engine;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode,
    body::{Bytes, Incoming},
    header::CONTENT_TYPE,
    server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use ingest_engine::IngestMetrics;
use log::{error, info, warn};
use serde::Serialize;
use serde_json::{Value, json};
use series_store::{SeriesRegistry, SeriesSnapshot, SnapshotReader};
use store_client::HistoricalStore;
use thiserror::Error;
use tokio::{net::TcpListener, sync::oneshot};

use crate::exporter::MetricsExporter;

const UI_PAGE: &str = include_str!("ui.html");
pub const LOAD_METRICS: [&str; 3] = ["loadavg1", "loadavg5", "loadavg15"];
pub const MEM_METRIC: &str = "freemem";
const BYTES_PER_MB: f64 = 1_048_576.0;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Everything a request handler reads from.
pub struct AppState {
    pub reader: SnapshotReader,
    pub store: Arc<dyn HistoricalStore>,
    pub engine: Arc<dyn Engine>,
    pub ingest: IngestMetrics,
    /// Display label per metric.
    pub labels: HashMap<MetricId, String>,
    /// Store datasource per metric, used for the windowed stats.
    pub datasources: HashMap<MetricId, String>,
    pub stats_window_secs: i64,
}

impl AppState {
    fn label<'a>(&'a self, id: &'a str) -> &'a str {
        self.labels.get(id).map(String::as_str).unwrap_or(id)
    }

    /// Store datasource of a registered metric; unregistered ids fail with `UnknownMetric`.
    fn datasource<'a>(&'a self, id: &'a str) -> series_store::Result<&'a str> {
        self.reader.registry().get(id)?;
        Ok(self.datasources.get(id).map(String::as_str).unwrap_or(id))
    }
}

/// Dashboard metrics absent from `registry`; their endpoints answer 404.
pub fn missing_dashboard_metrics(registry: &SeriesRegistry) -> Vec<&'static str> {
    LOAD_METRICS
        .iter()
        .copied()
        .chain([MEM_METRIC])
        .filter(|id| !registry.contains(id))
        .collect()
}

pub struct HttpServer {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl HttpServer {
    /// Binds synchronously so address errors surface to the caller, then serves on a dedicated
    /// runtime thread until [`HttpServer::shutdown`].
    pub fn start(state: Arc<AppState>, addr: SocketAddr) -> Result<Self, ServerError> {
        let listener = std::net::TcpListener::bind(addr)
            .and_then(|listener| {
                listener.set_nonblocking(true)?;
                Ok(listener)
            })
            .map_err(|source| ServerError::Bind { addr, source })?;
        let exporter = Arc::new(MetricsExporter::new()?);
        info!("[http] listening on {addr}");
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = thread::spawn(move || {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime,
                Err(err) => {
                    error!("[http] failed to start runtime: {err}");
                    return;
                }
            };
            runtime.block_on(run_http(listener, state, exporter, shutdown_rx));
        });
        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

async fn run_http(
    listener: std::net::TcpListener,
    state: Arc<AppState>,
    exporter: Arc<MetricsExporter>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let listener = match TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(err) => {
            error!("[http] failed to register listener: {err}");
            return;
        }
    };
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, _)) => {
                        let state = Arc::clone(&state);
                        let exporter = Arc::clone(&exporter);
                        tokio::spawn(async move {
                            if let Err(err) = serve_connection(stream, state, exporter).await {
                                warn!("[http] connection error: {err}");
                            }
                        });
                    }
                    Err(err) => warn!("[http] accept error: {err}"),
                }
            }
        }
    }
    info!("[http] server stopped");
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    state: Arc<AppState>,
    exporter: Arc<MetricsExporter>,
) -> Result<(), hyper::Error> {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let state = Arc::clone(&state);
        let exporter = Arc::clone(&exporter);
        async move {
            let route = Route::parse(req.method(), req.uri().path());
            Ok::<_, hyper::Error>(respond(route, &state, &exporter).await)
        }
    });
    http1::Builder::new().serve_connection(io, service).await?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route<'a> {
    Status,
    Ui,
    Series(&'a str),
    Load,
    Mem,
    Stats,
    Metrics,
    NotFound,
}

impl<'a> Route<'a> {
    fn parse(method: &Method, path: &'a str) -> Self {
        if method != Method::GET {
            return Route::NotFound;
        }
        match path {
            "/status" => Route::Status,
            "/ui" => Route::Ui,
            "/ui/load" => Route::Load,
            "/ui/mem" => Route::Mem,
            "/ui/stats" => Route::Stats,
            "/metrics" => Route::Metrics,
            _ => match path.strip_prefix("/ui/series/") {
                Some(metric) if !metric.is_empty() && !metric.contains('/') => {
                    Route::Series(metric)
                }
                _ => Route::NotFound,
            },
        }
    }
}

async fn respond(
    route: Route<'_>,
    state: &AppState,
    exporter: &MetricsExporter,
) -> Response<Full<Bytes>> {
    match route {
        Route::Status => text(StatusCode::OK, "active\n"),
        Route::Ui => with_type(StatusCode::OK, "text/html; charset=utf-8", UI_PAGE),
        Route::Series(metric) => match series_view(state, metric, 1.0) {
            Ok(view) => json_response(StatusCode::OK, &view),
            Err(err) => text(StatusCode::NOT_FOUND, err.to_string()),
        },
        Route::Load => {
            let views: series_store::Result<Vec<SeriesView>> = LOAD_METRICS
                .iter()
                .map(|metric| series_view(state, metric, 1.0))
                .collect();
            match views {
                Ok(views) => json_response(StatusCode::OK, &views),
                Err(err) => text(StatusCode::NOT_FOUND, err.to_string()),
            }
        }
        Route::Mem => match series_view(state, MEM_METRIC, BYTES_PER_MB) {
            Ok(view) => json_response(StatusCode::OK, &view),
            Err(err) => text(StatusCode::NOT_FOUND, err.to_string()),
        },
        Route::Stats => match window_stats(state, now_millis()).await {
            Ok(body) => json_response(StatusCode::OK, &body),
            Err(err) => text(StatusCode::NOT_FOUND, err.to_string()),
        },
        Route::Metrics => {
            let rendered = exporter.render(
                state.reader.registry(),
                state.ingest.snapshot(),
                &state.engine.health(),
            );
            match rendered {
                Ok(body) => with_type(StatusCode::OK, "text/plain; version=0.0.4", body),
                Err(err) => {
                    error!("[http] metrics render failed: {err}");
                    text(StatusCode::INTERNAL_SERVER_ERROR, "metrics_unavailable")
                }
            }
        }
        Route::NotFound => text(StatusCode::NOT_FOUND, "not found"),
    }
}

#[derive(Debug, Serialize)]
struct SeriesView<'a> {
    metric: &'a str,
    label: &'a str,
    #[serde(flatten)]
    snapshot: SeriesSnapshot,
}

/// Each call takes its own snapshot; views of different metrics are not mutually consistent.
fn series_view<'a>(
    state: &'a AppState,
    metric: &'a str,
    divisor: f64,
) -> series_store::Result<SeriesView<'a>> {
    let snapshot = state.reader.snapshot(metric)?;
    let snapshot = if divisor == 1.0 {
        snapshot
    } else {
        snapshot.scaled(divisor)
    };
    Ok(SeriesView {
        metric,
        label: state.label(metric),
        snapshot,
    })
}

async fn window_stats(state: &AppState, now_ms: i64) -> series_store::Result<Value> {
    let since_ms = now_ms.saturating_sub(state.stats_window_secs.saturating_mul(1_000));
    let mem = state.datasource(MEM_METRIC)?;
    let load = state.datasource(LOAD_METRICS[0])?;
    let (mem_min, mem_max, load_min, load_max, load_sd) = tokio::join!(
        aggregate(state, mem, since_ms, AggregateFn::Min),
        aggregate(state, mem, since_ms, AggregateFn::Max),
        aggregate(state, load, since_ms, AggregateFn::Min),
        aggregate(state, load, since_ms, AggregateFn::Max),
        aggregate(state, load, since_ms, AggregateFn::StdDev),
    );
    Ok(json!({
        "mem": {"min": mem_min, "max": mem_max},
        "load": {"min": load_min, "max": load_max, "sd": load_sd},
    }))
}

async fn aggregate(
    state: &AppState,
    datasource: &str,
    since_ms: i64,
    func: AggregateFn,
) -> Option<f64> {
    match state.store.fetch_aggregate(datasource, since_ms, func).await {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("[http] {func} of '{datasource}' since {since_ms} failed: {err}");
            None
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => with_type(status, "application/json", bytes),
        Err(err) => {
            error!("[http] failed to encode response: {err}");
            text(StatusCode::INTERNAL_SERVER_ERROR, "encode error")
        }
    }
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    with_type(status, "text/plain; charset=utf-8", body)
}

fn with_type(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        hyper::header::HeaderValue::from_static(content_type),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use core_types::StorePoint;
    use engine_api::{EngineHealth, EngineResult, HealthStatus};
    use http_body_util::BodyExt;
    use std::sync::Mutex;
    use store_client::StoreError;

    struct StatsStore {
        calls: Mutex<Vec<(String, i64, AggregateFn)>>,
    }

    #[async_trait]
    impl HistoricalStore for StatsStore {
        async fn fetch_last_n(
            &self,
            _datasource: &str,
            _n: usize,
        ) -> Result<Vec<StorePoint>, StoreError> {
            Ok(Vec::new())
        }

        async fn fetch_aggregate(
            &self,
            datasource: &str,
            since_ms: i64,
            func: AggregateFn,
        ) -> Result<f64, StoreError> {
            self.calls
                .lock()
                .unwrap()
                .push((datasource.to_string(), since_ms, func));
            match (datasource, func) {
                ("freemem", AggregateFn::Min) => Ok(1_024.0),
                ("freemem", AggregateFn::Max) => Ok(4_096.0),
                ("loadavg1", AggregateFn::StdDev) => Err(StoreError::Http(500)),
                ("loadavg1", _) => Ok(0.5),
                _ => Err(StoreError::Http(404)),
            }
        }
    }

    struct IdleEngine;

    impl Engine for IdleEngine {
        fn label(&self) -> &str {
            "idle"
        }

        fn start(&self) -> EngineResult<()> {
            Ok(())
        }

        fn stop(&self) -> EngineResult<()> {
            Ok(())
        }

        fn health(&self) -> EngineHealth {
            EngineHealth::new(HealthStatus::Ready, None)
        }
    }

    fn state() -> (AppState, Arc<StatsStore>) {
        state_with(&["loadavg1", "loadavg5", "loadavg15", "freemem"])
    }

    fn state_with(ids: &[&str]) -> (AppState, Arc<StatsStore>) {
        let registry = Arc::new(SeriesRegistry::new(10, ids.iter().copied()).unwrap());
        let store = Arc::new(StatsStore {
            calls: Mutex::new(Vec::new()),
        });
        let state = AppState {
            reader: SnapshotReader::new(registry),
            store: store.clone(),
            engine: Arc::new(IdleEngine),
            ingest: IngestMetrics::new(),
            labels: HashMap::from([
                (MetricId::new("loadavg1"), "1 min".to_string()),
                (MetricId::new("freemem"), "Mem".to_string()),
            ]),
            datasources: HashMap::new(),
            stats_window_secs: 300,
        };
        (state, store)
    }

    async fn call(state: &AppState, method: Method, path: &str) -> (StatusCode, Bytes) {
        let exporter = MetricsExporter::new().unwrap();
        let response = respond(Route::parse(&method, path), state, &exporter).await;
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    fn add(state: &AppState, metric: &str, value: f64, ts: i64) {
        state.reader.registry().get(metric).unwrap().add(value, ts);
    }

    #[test]
    fn parses_routes() {
        let get = Method::GET;
        assert_eq!(Route::parse(&get, "/status"), Route::Status);
        assert_eq!(Route::parse(&get, "/ui"), Route::Ui);
        assert_eq!(
            Route::parse(&get, "/ui/series/loadavg5"),
            Route::Series("loadavg5")
        );
        assert_eq!(Route::parse(&get, "/ui/series/"), Route::NotFound);
        assert_eq!(Route::parse(&get, "/ui/series/a/b"), Route::NotFound);
        assert_eq!(Route::parse(&get, "/metrics"), Route::Metrics);
        assert_eq!(Route::parse(&get, "/elsewhere"), Route::NotFound);
        assert_eq!(Route::parse(&Method::POST, "/status"), Route::NotFound);
    }

    #[tokio::test]
    async fn status_reports_active() {
        let (state, _) = state();
        let (status, body) = call(&state, Method::GET, "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"active\n");
    }

    #[tokio::test]
    async fn series_returns_snapshot_with_label() {
        let (state, _) = state();
        add(&state, "loadavg1", 0.25, 100);
        add(&state, "loadavg1", 0.5, 101);
        let (status, body) = call(&state, Method::GET, "/ui/series/loadavg1").await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value,
            json!({"metric": "loadavg1", "label": "1 min", "values": [0.25, 0.5], "timestamps": [100, 101]})
        );
    }

    #[tokio::test]
    async fn unknown_series_is_not_found() {
        let (state, _) = state();
        let (status, body) = call(&state, Method::GET, "/ui/series/cpu").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(String::from_utf8_lossy(&body).contains("cpu"));
    }

    #[tokio::test]
    async fn load_returns_three_independent_series() {
        let (state, _) = state();
        add(&state, "loadavg1", 1.0, 100);
        add(&state, "loadavg15", 15.0, 102);
        let (_, body) = call(&state, Method::GET, "/ui/load").await;
        let value: Value = serde_json::from_slice(&body).unwrap();
        let views = value.as_array().unwrap();
        assert_eq!(views.len(), 3);
        assert_eq!(views[0]["timestamps"], json!([100]));
        assert_eq!(views[1]["values"], json!([]));
        assert_eq!(views[1]["label"], json!("loadavg5"));
        assert_eq!(views[2]["values"], json!([15.0]));
    }

    #[tokio::test]
    async fn mem_is_scaled_to_megabytes() {
        let (state, _) = state();
        add(&state, "freemem", 2_097_152.0, 100);
        let (_, body) = call(&state, Method::GET, "/ui/mem").await;
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["values"], json!([2.0]));
        assert_eq!(value["timestamps"], json!([100]));
        assert_eq!(value["label"], json!("Mem"));
    }

    #[tokio::test]
    async fn stats_query_the_window_and_null_failures() {
        let (state, store) = state();
        let value = window_stats(&state, 1_000_000).await.unwrap();
        assert_eq!(
            value,
            json!({
                "mem": {"min": 1024.0, "max": 4096.0},
                "load": {"min": 0.5, "max": 0.5, "sd": null},
            })
        );
        let calls = store.calls.lock().unwrap();
        assert_eq!(calls.len(), 5);
        assert!(calls.iter().all(|(_, since, _)| *since == 700_000));
    }

    #[tokio::test]
    async fn metrics_exposes_prometheus_text() {
        let (state, _) = state();
        add(&state, "freemem", 1.0, 1);
        let (status, body) = call(&state, Method::GET, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains(r#"monitor_series_points{metric="freemem"} 1"#));
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let (state, _) = state();
        let (status, _) = call(&state, Method::GET, "/ui/mem.png").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn load_with_unregistered_window_is_not_found() {
        let (state, _) = state_with(&["loadavg1", "loadavg15", "freemem"]);
        add(&state, "loadavg1", 1.0, 100);
        let (status, body) = call(&state, Method::GET, "/ui/load").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(String::from_utf8_lossy(&body).contains("loadavg5"));
    }

    #[tokio::test]
    async fn stats_for_unregistered_metric_skip_the_store() {
        let (state, store) = state_with(&["loadavg1", "loadavg5", "loadavg15"]);
        let (status, body) = call(&state, Method::GET, "/ui/stats").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(String::from_utf8_lossy(&body).contains("freemem"));
        assert!(store.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn huge_stats_window_does_not_overflow() {
        let (mut state, store) = state();
        state.stats_window_secs = i64::MAX / 10;
        let value = window_stats(&state, 1_000).await.unwrap();
        assert_eq!(value["mem"]["min"], json!(1024.0));
        let calls = store.calls.lock().unwrap();
        assert!(calls.iter().all(|(_, since, _)| *since == 1_000 - i64::MAX));
    }

    #[test]
    fn reports_dashboard_metrics_missing_from_registry() {
        let registry = SeriesRegistry::new(3, ["loadavg1", "freemem", "cpu"]).unwrap();
        assert_eq!(missing_dashboard_metrics(&registry), vec!["loadavg5", "loadavg15"]);
        let full = SeriesRegistry::new(3, ["loadavg1", "loadavg5", "loadavg15", "freemem"]).unwrap();
        assert!(missing_dashboard_metrics(&full).is_empty());
    }

    #[test]
    fn dashboard_requests_are_relative_to_the_page() {
        assert!(!UI_PAGE.contains("fetch(\"/"));
        for endpoint in ["ui/mem", "ui/load", "ui/stats"] {
            assert!(UI_PAGE.contains(&format!("fetch(\"{endpoint}\")")));
        }
    }
}
