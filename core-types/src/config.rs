// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{collections::HashSet, net::SocketAddr, time::Duration};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::MetricId;

const CONFIG_FILE: &str = "monitor.toml";
const ENV_PREFIX: &str = "MONITOR";
/// Largest stats window whose millisecond span still fits in an `i64`.
pub const MAX_STATS_WINDOW_SECS: i64 = i64::MAX / 1_000;

/// Top-level knobs for the monitor process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub series: SeriesConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default = "default_metrics")]
    pub metrics: Vec<MetricConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            series: SeriesConfig::default(),
            ingest: IngestConfig::default(),
            store: StoreConfig::default(),
            live: LiveConfig::default(),
            export: ExportConfig::default(),
            http: HttpConfig::default(),
            stats: StatsConfig::default(),
            metrics: default_metrics(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Points requested per metric from the historical store at startup.
    #[serde(default = "default_history_points")]
    pub history_points: usize,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            history_points: default_history_points(),
        }
    }
}

fn default_capacity() -> usize {
    500
}

fn default_history_points() -> usize {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,
    /// Upper bound on messages taken from one source per router iteration.
    #[serde(default = "default_drain_budget")]
    pub drain_budget: usize,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            idle_backoff_ms: default_idle_backoff_ms(),
            drain_budget: default_drain_budget(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_idle_backoff_ms() -> u64 {
    10
}

fn default_drain_budget() -> usize {
    64
}

fn default_channel_capacity() -> usize {
    4_096
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_url")]
    pub base_url: String,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_store_url(),
            timeout_secs: default_store_timeout_secs(),
            fetch_attempts: default_fetch_attempts(),
        }
    }
}

fn default_store_url() -> String {
    "http://127.0.0.1:5555".to_string()
}

fn default_store_timeout_secs() -> u64 {
    20
}

fn default_fetch_attempts() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    #[serde(default = "default_live_url")]
    pub base_url: String,
    /// Deadline for one websocket connect, handshake included.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            base_url: default_live_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_live_url() -> String {
    "ws://127.0.0.1:5555".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Metric whose raw payloads are mirrored to `url`; empty disables export.
    #[serde(default = "default_export_metric")]
    pub metric: String,
    #[serde(default = "default_export_url")]
    pub url: String,
    #[serde(default = "default_export_queue")]
    pub queue_capacity: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            metric: default_export_metric(),
            url: default_export_url(),
            queue_capacity: default_export_queue(),
        }
    }
}

fn default_export_metric() -> String {
    "freemem".to_string()
}

fn default_export_url() -> String {
    "https://export.amar.io/".to_string()
}

fn default_export_queue() -> usize {
    256
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_addr")]
    pub addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_stats_window_secs")]
    pub window_secs: i64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            window_secs: default_stats_window_secs(),
        }
    }
}

fn default_stats_window_secs() -> i64 {
    300
}

/// One monitored metric: registry id, store datasource id, and display label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    pub id: String,
    #[serde(default)]
    pub datasource: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl MetricConfig {
    fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            datasource: None,
            label: Some(label.to_string()),
        }
    }

    pub fn metric_id(&self) -> MetricId {
        MetricId::new(&self.id)
    }

    /// Datasource id used against the store; defaults to the metric id.
    pub fn datasource(&self) -> &str {
        self.datasource.as_deref().unwrap_or(&self.id)
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

fn default_metrics() -> Vec<MetricConfig> {
    vec![
        MetricConfig::new("loadavg1", "1 min"),
        MetricConfig::new("loadavg5", "5 min"),
        MetricConfig::new("loadavg15", "15 min"),
        MetricConfig::new("freemem", "Mem"),
    ]
}

impl MonitorConfig {
    /// Layers `monitor.toml` (optional) under `MONITOR_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.series.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.series.history_points == 0 {
            return Err(ConfigError::ZeroHistory);
        }
        if self.metrics.is_empty() {
            return Err(ConfigError::NoMetrics);
        }
        let mut seen = HashSet::new();
        for metric in &self.metrics {
            if !seen.insert(metric.id.as_str()) {
                return Err(ConfigError::DuplicateMetric {
                    id: metric.id.clone(),
                });
            }
        }
        if let Some(export) = self.export_metric() {
            if !seen.contains(export.as_str()) {
                return Err(ConfigError::UnknownExportMetric {
                    id: export.to_string(),
                });
            }
        }
        if self.live.connect_timeout_secs == 0 {
            return Err(ConfigError::ZeroConnectTimeout);
        }
        let window = self.stats.window_secs;
        if window <= 0 || window > MAX_STATS_WINDOW_SECS {
            return Err(ConfigError::InvalidStatsWindow { value: window });
        }
        self.http_addr()?;
        Ok(())
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.ingest.idle_backoff_ms.max(1))
    }

    pub fn live_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.live.connect_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store.timeout_secs)
    }

    pub fn export_metric(&self) -> Option<MetricId> {
        let trimmed = self.export.metric.trim();
        (!trimmed.is_empty()).then(|| MetricId::new(trimmed))
    }

    pub fn http_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.http
            .addr
            .parse()
            .map_err(|_| ConfigError::InvalidAddr {
                value: self.http.addr.clone(),
            })
    }

    pub fn metric(&self, id: &str) -> Option<&MetricConfig> {
        self.metrics.iter().find(|m| m.id == id)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config load failed: {0}")]
    Load(#[from] config::ConfigError),
    #[error("series.capacity must be positive")]
    ZeroCapacity,
    #[error("series.history_points must be positive")]
    ZeroHistory,
    #[error("no metrics configured")]
    NoMetrics,
    #[error("metric '{id}' configured twice")]
    DuplicateMetric { id: String },
    #[error("export.metric '{id}' is not a configured metric")]
    UnknownExportMetric { id: String },
    #[error("invalid http.addr '{value}'")]
    InvalidAddr { value: String },
    #[error("live.connect_timeout_secs must be positive")]
    ZeroConnectTimeout,
    #[error("stats.window_secs must be positive and fit in milliseconds, got {value}")]
    InvalidStatsWindow { value: i64 },
}
