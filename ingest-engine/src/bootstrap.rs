// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! One-shot seeding of each series from the historical store before live ingestion starts.

use std::sync::Arc;

use core_types::{MetricId, StorePoint, millis_to_secs, retry::RetryPolicy};
use futures::future::join_all;
use log::{info, warn};
use series_store::{SeriesError, SeriesRegistry};
use store_client::{HistoricalStore, StoreError, StoreOrder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoricalFetchError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Series(#[from] SeriesError),
}

impl HistoricalFetchError {
    fn is_unreachable(&self) -> bool {
        matches!(self, HistoricalFetchError::Store(err) if err.is_unreachable())
    }
}

/// A metric to seed and the datasource it is stored under.
#[derive(Debug, Clone)]
pub struct SeedTarget {
    pub metric: MetricId,
    pub datasource: String,
}

#[derive(Debug, Default)]
pub struct BootstrapReport {
    /// Points appended per metric.
    pub seeded: Vec<(MetricId, usize)>,
    pub failed: Vec<(MetricId, HistoricalFetchError)>,
}

impl BootstrapReport {
    /// Every metric failed because the store could not be reached at all.
    pub fn store_unreachable(&self) -> bool {
        self.seeded.is_empty()
            && !self.failed.is_empty()
            && self.failed.iter().all(|(_, err)| err.is_unreachable())
    }

    pub fn seeded_points(&self, metric: &str) -> Option<usize> {
        self.seeded
            .iter()
            .find(|(id, _)| id.as_str() == metric)
            .map(|(_, n)| *n)
    }
}

pub struct Bootstrapper {
    store: Arc<dyn HistoricalStore>,
    points: usize,
    retry: RetryPolicy,
}

impl Bootstrapper {
    pub fn new(store: Arc<dyn HistoricalStore>, points: usize) -> Self {
        Self {
            store,
            points,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Seeds every target concurrently. Failures only leave that metric's series empty.
    pub async fn seed(&self, registry: &SeriesRegistry, targets: &[SeedTarget]) -> BootstrapReport {
        let outcomes = join_all(
            targets
                .iter()
                .map(|target| async move { (target, self.seed_one(registry, target).await) }),
        )
        .await;
        let mut report = BootstrapReport::default();
        for (target, outcome) in outcomes {
            match outcome {
                Ok(count) => {
                    info!("[bootstrap:{}] seeded {count} historical points", target.metric);
                    report.seeded.push((target.metric.clone(), count));
                }
                Err(err) => {
                    warn!(
                        "[bootstrap:{}] history unavailable, starting empty: {err}",
                        target.metric
                    );
                    report.failed.push((target.metric.clone(), err));
                }
            }
        }
        report
    }

    async fn seed_one(
        &self,
        registry: &SeriesRegistry,
        target: &SeedTarget,
    ) -> Result<usize, HistoricalFetchError> {
        let series = registry.get(target.metric.as_str())?;
        let points = self
            .retry
            .retry_async(|_| self.store.fetch_last_n(&target.datasource, self.points))
            .await?;
        let ordered = chronological(points, self.store.order());
        for point in &ordered {
            series.add(point.value, millis_to_secs(point.timestamp_ms));
        }
        Ok(ordered.len())
    }
}

fn chronological(mut points: Vec<StorePoint>, order: StoreOrder) -> Vec<StorePoint> {
    if order == StoreOrder::NewestFirst {
        points.reverse();
    }
    points
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use core_types::AggregateFn;
    use parking_lot::Mutex;
    use std::{collections::HashMap, time::Duration};

    /// In-memory store returning canned histories newest-first.
    #[derive(Default)]
    pub(crate) struct FakeStore {
        pub(crate) histories: HashMap<String, Vec<StorePoint>>,
        pub(crate) broken: Vec<String>,
        pub(crate) calls: Mutex<Vec<String>>,
        pub(crate) order: Option<StoreOrder>,
    }

    impl FakeStore {
        /// `count` points one second apart ending at `last_s`, stored newest-first.
        pub(crate) fn with_history(mut self, datasource: &str, count: i64, last_s: i64) -> Self {
            let points = (0..count)
                .map(|i| StorePoint {
                    value: (last_s - i) as f64,
                    timestamp_ms: (last_s - i) * 1_000,
                })
                .collect();
            self.histories.insert(datasource.to_string(), points);
            self
        }
    }

    #[async_trait]
    impl HistoricalStore for FakeStore {
        async fn fetch_last_n(
            &self,
            datasource: &str,
            n: usize,
        ) -> Result<Vec<StorePoint>, StoreError> {
            self.calls.lock().push(datasource.to_string());
            if self.broken.iter().any(|b| b == datasource) {
                return Err(StoreError::Http(500));
            }
            let mut points = self.histories.get(datasource).cloned().unwrap_or_default();
            points.truncate(n);
            Ok(points)
        }

        async fn fetch_aggregate(
            &self,
            _datasource: &str,
            _since_ms: i64,
            _func: AggregateFn,
        ) -> Result<f64, StoreError> {
            Err(StoreError::Http(501))
        }

        fn order(&self) -> StoreOrder {
            self.order.unwrap_or(StoreOrder::NewestFirst)
        }
    }

    fn target(id: &str) -> SeedTarget {
        SeedTarget {
            metric: MetricId::new(id),
            datasource: id.to_string(),
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(1), 0.0)
    }

    #[tokio::test]
    async fn newest_first_history_is_seeded_oldest_first() {
        let registry = SeriesRegistry::new(10, ["loadavg1"]).unwrap();
        let store = Arc::new(FakeStore::default().with_history("loadavg1", 3, 1_000));
        let report = Bootstrapper::new(store, 10)
            .seed(&registry, &[target("loadavg1")])
            .await;
        assert_eq!(report.seeded_points("loadavg1"), Some(3));
        let snap = registry.get("loadavg1").unwrap().snapshot();
        assert_eq!(snap.timestamps, vec![998, 999, 1_000]);
        assert_eq!(snap.values, vec![998.0, 999.0, 1_000.0]);
    }

    #[tokio::test]
    async fn oldest_first_store_is_not_reversed() {
        let registry = SeriesRegistry::new(10, ["m"]).unwrap();
        let mut store = FakeStore {
            order: Some(StoreOrder::OldestFirst),
            ..Default::default()
        };
        store.histories.insert(
            "m".into(),
            vec![
                StorePoint { value: 1.0, timestamp_ms: 1_000 },
                StorePoint { value: 2.0, timestamp_ms: 2_000 },
            ],
        );
        Bootstrapper::new(Arc::new(store), 10)
            .seed(&registry, &[target("m")])
            .await;
        assert_eq!(registry.get("m").unwrap().snapshot().timestamps, vec![1, 2]);
    }

    #[tokio::test]
    async fn failing_metric_starts_empty_without_blocking_others() {
        let registry = SeriesRegistry::new(10, ["loadavg1", "freemem"]).unwrap();
        let store = Arc::new(FakeStore {
            broken: vec!["freemem".into()],
            ..FakeStore::default().with_history("loadavg1", 4, 50)
        });
        let report = Bootstrapper::new(store.clone(), 10)
            .with_retry(fast_retry())
            .seed(&registry, &[target("freemem"), target("loadavg1")])
            .await;
        assert_eq!(report.seeded_points("loadavg1"), Some(4));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0.as_str(), "freemem");
        assert!(!report.store_unreachable());
        assert!(registry.get("freemem").unwrap().is_empty());
        let freemem_calls = store.calls.lock().iter().filter(|c| *c == "freemem").count();
        assert_eq!(freemem_calls, 2);
    }

    #[tokio::test]
    async fn unregistered_target_is_reported_not_fatal() {
        let registry = SeriesRegistry::new(10, ["loadavg1"]).unwrap();
        let store = Arc::new(FakeStore::default());
        let report = Bootstrapper::new(store, 10)
            .seed(&registry, &[target("swap"), target("loadavg1")])
            .await;
        assert!(matches!(
            report.failed[0].1,
            HistoricalFetchError::Series(SeriesError::UnknownMetric { .. })
        ));
        assert_eq!(report.seeded_points("loadavg1"), Some(0));
    }

    #[tokio::test]
    async fn history_then_live_keeps_arrival_order() {
        let registry = SeriesRegistry::new(500, ["freemem"]).unwrap();
        let store = Arc::new(FakeStore::default().with_history("freemem", 500, 10_000));
        Bootstrapper::new(store, 500)
            .seed(&registry, &[target("freemem")])
            .await;
        let series = registry.get("freemem").unwrap();
        for i in 1..=10 {
            series.add(-(i as f64), 20_000 + i);
        }
        let snap = series.snapshot();
        assert_eq!(snap.len(), 500);
        let first_ten: Vec<i64> = snap.timestamps[..10].to_vec();
        assert_eq!(first_ten, (9_511..=9_520).collect::<Vec<i64>>());
        let last_ten: Vec<i64> = snap.timestamps[490..].to_vec();
        assert_eq!(last_ten, (20_001..=20_010).collect::<Vec<i64>>());
    }

    #[test]
    fn unreachable_needs_every_metric_failing_on_transport() {
        let report = BootstrapReport {
            seeded: Vec::new(),
            failed: vec![(
                MetricId::new("a"),
                HistoricalFetchError::Store(StoreError::Http(500)),
            )],
        };
        assert!(!report.store_unreachable());
        assert!(!BootstrapReport::default().store_unreachable());
    }
}
