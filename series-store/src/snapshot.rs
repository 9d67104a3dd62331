// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::sync::Arc;

use core_types::MetricId;
use serde::Serialize;

use crate::{error::Result, registry::SeriesRegistry};

/// Point-in-time copy of one series. Timestamps are unix seconds, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesSnapshot {
    pub values: Vec<f64>,
    pub timestamps: Vec<i64>,
}

impl SeriesSnapshot {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// (value, timestamp) pairs in window order.
    pub fn points(&self) -> impl Iterator<Item = (f64, i64)> + '_ {
        self.values
            .iter()
            .copied()
            .zip(self.timestamps.iter().copied())
    }

    pub fn latest(&self) -> Option<(f64, i64)> {
        Some((*self.values.last()?, *self.timestamps.last()?))
    }

    /// Copy with every value divided by `divisor` (bytes to megabytes for memory charts).
    pub fn scaled(&self, divisor: f64) -> Self {
        Self {
            values: self.values.iter().map(|v| v / divisor).collect(),
            timestamps: self.timestamps.clone(),
        }
    }
}

/// Read handle shared by the HTTP handlers.
///
/// Each series is copied under its own read lock; a multi-series read gives no cross-series time
/// alignment, so consumers must pair values only with the timestamps of the same snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    registry: Arc<SeriesRegistry>,
}

impl SnapshotReader {
    pub fn new(registry: Arc<SeriesRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SeriesRegistry> {
        &self.registry
    }

    pub fn snapshot(&self, id: &str) -> Result<SeriesSnapshot> {
        Ok(self.registry.get(id)?.snapshot())
    }

    /// Snapshots each requested series independently; fails on the first unknown id.
    pub fn snapshot_many<'a, I>(&self, ids: I) -> Result<Vec<(MetricId, SeriesSnapshot)>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        ids.into_iter()
            .map(|id| {
                let series = self.registry.get(id)?;
                Ok((MetricId::new(id), series.snapshot()))
            })
            .collect()
    }

    pub fn snapshot_all(&self) -> Vec<(MetricId, SeriesSnapshot)> {
        self.registry
            .iter()
            .map(|(id, series)| (id.clone(), series.snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SeriesError;

    fn reader() -> SnapshotReader {
        let registry = SeriesRegistry::new(3, ["loadavg1", "loadavg5", "freemem"]).unwrap();
        SnapshotReader::new(Arc::new(registry))
    }

    #[test]
    fn snapshot_reflects_series_contents() {
        let reader = reader();
        let series = reader.registry().get("loadavg1").unwrap();
        series.add(0.5, 10);
        series.add(0.7, 11);
        let snap = reader.snapshot("loadavg1").unwrap();
        assert_eq!(snap.points().collect::<Vec<_>>(), vec![(0.5, 10), (0.7, 11)]);
        assert_eq!(snap.latest(), Some((0.7, 11)));
    }

    #[test]
    fn unknown_metric_surfaces_to_caller() {
        let err = reader().snapshot("swap").unwrap_err();
        assert!(matches!(err, SeriesError::UnknownMetric { id } if id == "swap"));
    }

    #[test]
    fn snapshot_many_keeps_each_series_own_timestamps() {
        let reader = reader();
        reader.registry().get("loadavg1").unwrap().add(1.0, 100);
        reader.registry().get("loadavg5").unwrap().add(5.0, 103);
        reader.registry().get("loadavg5").unwrap().add(5.5, 104);
        let snaps = reader.snapshot_many(["loadavg1", "loadavg5"]).unwrap();
        assert_eq!(snaps[0].0.as_str(), "loadavg1");
        assert_eq!(snaps[0].1.timestamps, vec![100]);
        assert_eq!(snaps[1].1.timestamps, vec![103, 104]);
    }

    #[test]
    fn snapshot_many_fails_on_unknown_id() {
        assert!(reader().snapshot_many(["loadavg1", "nope"]).is_err());
    }

    #[test]
    fn scaled_divides_values_only() {
        let snap = SeriesSnapshot {
            values: vec![1_048_576.0, 2_097_152.0],
            timestamps: vec![1, 2],
        };
        let mb = snap.scaled(1_048_576.0);
        assert_eq!(mb.values, vec![1.0, 2.0]);
        assert_eq!(mb.timestamps, vec![1, 2]);
    }

    #[test]
    fn snapshot_serializes_as_parallel_arrays() {
        let snap = SeriesSnapshot {
            values: vec![0.25],
            timestamps: vec![1_700_000_000],
        };
        let json = serde_json::to_string(&snap).unwrap();
        assert_eq!(json, r#"{"values":[0.25],"timestamps":[1700000000]}"#);
    }

    #[test]
    fn snapshot_all_covers_registry_in_order() {
        let all = reader().snapshot_all();
        let ids: Vec<&str> = all.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["loadavg1", "loadavg5", "freemem"]);
        assert!(all.iter().all(|(_, snap)| snap.is_empty()));
    }
}
