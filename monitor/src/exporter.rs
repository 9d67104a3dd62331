// Copyright (c) James Kassemi, SC, US. All rights reserved.

use engine_api::{EngineHealth, HealthStatus};
use ingest_engine::IngestMetricsSnapshot;
use prometheus::{Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use series_store::SeriesRegistry;

/// Prometheus view over the series registry and the ingest counters.
pub struct MetricsExporter {
    registry: Registry,
    series_points: IntGaugeVec,
    series_capacity: IntGauge,
    ingest_total: IntGaugeVec,
    engine_up: IntGauge,
}

impl MetricsExporter {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let series_points = IntGaugeVec::new(
            Opts::new("monitor_series_points", "Points currently held per metric series"),
            &["metric"],
        )?;
        registry.register(Box::new(series_points.clone()))?;
        let series_capacity = IntGauge::with_opts(Opts::new(
            "monitor_series_capacity",
            "Configured capacity of every metric series",
        ))?;
        registry.register(Box::new(series_capacity.clone()))?;
        let ingest_total = IntGaugeVec::new(
            Opts::new(
                "monitor_ingest_total",
                "Cumulative ingestion router events by outcome",
            ),
            &["event"],
        )?;
        registry.register(Box::new(ingest_total.clone()))?;
        let engine_up = IntGauge::with_opts(Opts::new(
            "monitor_ingest_engine_up",
            "1 while the ingest engine is ready, 0 otherwise",
        ))?;
        registry.register(Box::new(engine_up.clone()))?;
        Ok(Self {
            registry,
            series_points,
            series_capacity,
            ingest_total,
            engine_up,
        })
    }

    pub fn render(
        &self,
        series: &SeriesRegistry,
        ingest: IngestMetricsSnapshot,
        health: &EngineHealth,
    ) -> Result<Vec<u8>, prometheus::Error> {
        for (id, buffer) in series.iter() {
            self.series_points
                .with_label_values(&[id.as_str()])
                .set(buffer.len() as i64);
        }
        self.series_capacity.set(series.capacity() as i64);
        self.record_ingest(ingest);
        self.engine_up
            .set(i64::from(health.status == HealthStatus::Ready));
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    fn record_ingest(&self, snapshot: IngestMetricsSnapshot) {
        let events = [
            ("accepted", snapshot.accepted),
            ("decode_error", snapshot.decode_errors),
            ("export_sent", snapshot.export_sent),
            ("export_failed", snapshot.export_failed),
            ("export_dropped", snapshot.export_dropped),
            ("idle_iteration", snapshot.idle_iterations),
        ];
        for (event, count) in events {
            self.ingest_total
                .with_label_values(&[event])
                .set(count as i64);
        }
    }
}
