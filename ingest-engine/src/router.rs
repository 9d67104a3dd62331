// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Fan-in of the per-metric source channels into the series registry.

use std::{
    future::poll_fn,
    sync::Arc,
    task::Poll,
    time::Duration,
};

use core_types::{MetricId, now_millis};
use log::{info, warn};
use series_store::{BoundedSeries, SeriesError, SeriesRegistry};
use store_client::RawPayload;
use tokio::{
    sync::mpsc::{self, error::TryRecvError},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

use crate::{decode::decode_reading, export::ExportQueue, metrics::IngestMetrics};

#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    /// Longest the router waits for input before re-checking every source.
    pub idle_backoff: Duration,
    /// Messages taken from one source before moving to the next in the same pass.
    pub drain_budget: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            idle_backoff: Duration::from_millis(10),
            drain_budget: 64,
        }
    }
}

/// Why [`IngestionRouter::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterExit {
    Cancelled,
    SourcesClosed,
}

struct SourceLane {
    metric: MetricId,
    series: Arc<BoundedSeries>,
    rx: mpsc::Receiver<RawPayload>,
    export: bool,
    closed: bool,
}

/// Single task that drains every source channel and appends decoded readings to its series.
///
/// Each pass walks the lanes round-robin starting one lane later than the previous pass, taking up
/// to `drain_budget` ready messages per lane without waiting. When a pass finds nothing, the router
/// parks on all receivers at once for at most `idle_backoff`.
pub struct IngestionRouter {
    config: RouterConfig,
    lanes: Vec<SourceLane>,
    cursor: usize,
    export: Option<ExportQueue>,
    metrics: IngestMetrics,
}

impl IngestionRouter {
    pub fn new(config: RouterConfig, metrics: IngestMetrics) -> Self {
        Self {
            config: RouterConfig {
                idle_backoff: config.idle_backoff.max(Duration::from_millis(1)),
                drain_budget: config.drain_budget.max(1),
            },
            lanes: Vec::new(),
            cursor: 0,
            export: None,
            metrics,
        }
    }

    /// Binds `rx` to the registered series for `metric`.
    pub fn add_source(
        &mut self,
        registry: &SeriesRegistry,
        metric: &MetricId,
        rx: mpsc::Receiver<RawPayload>,
    ) -> Result<(), SeriesError> {
        let series = Arc::clone(registry.get(metric.as_str())?);
        self.lanes.push(SourceLane {
            metric: metric.clone(),
            series,
            rx,
            export: false,
            closed: false,
        });
        Ok(())
    }

    /// Mirrors successfully decoded payloads of `metric` into `queue`.
    pub fn with_export(mut self, metric: &MetricId, queue: ExportQueue) -> Self {
        for lane in self.lanes.iter_mut().filter(|lane| &lane.metric == metric) {
            lane.export = true;
        }
        self.export = Some(queue);
        self
    }

    pub fn source_count(&self) -> usize {
        self.lanes.len()
    }

    pub async fn run(mut self, cancel: CancellationToken) -> RouterExit {
        info!(
            "[ingest] router draining {} sources (backoff {:?}, budget {})",
            self.lanes.len(),
            self.config.idle_backoff,
            self.config.drain_budget
        );
        loop {
            if cancel.is_cancelled() {
                return RouterExit::Cancelled;
            }
            let drained = self.drain_pass();
            if self.all_closed() {
                warn!("[ingest] every source channel closed; router exiting");
                return RouterExit::SourcesClosed;
            }
            if drained > 0 {
                tokio::task::yield_now().await;
                continue;
            }
            self.metrics.inc_idle();
            let woke = tokio::select! {
                biased;
                _ = cancel.cancelled() => return RouterExit::Cancelled,
                woke = timeout(self.config.idle_backoff, next_ready(&mut self.lanes, self.cursor)) => woke,
            };
            if let Ok(Some((idx, next))) = woke {
                let lane = &mut self.lanes[idx];
                match next {
                    Some(payload) => {
                        apply(lane, payload, self.export.as_ref(), &self.metrics, now_millis())
                    }
                    None => close(lane),
                }
            }
        }
    }

    /// One non-blocking round over every open lane. Returns the number of messages handled.
    fn drain_pass(&mut self) -> usize {
        let count = self.lanes.len();
        if count == 0 {
            return 0;
        }
        let start = self.cursor % count;
        self.cursor = (start + 1) % count;
        let received_ms = now_millis();
        let mut drained = 0;
        for offset in 0..count {
            let lane = &mut self.lanes[(start + offset) % count];
            if lane.closed {
                continue;
            }
            for _ in 0..self.config.drain_budget {
                match lane.rx.try_recv() {
                    Ok(payload) => {
                        apply(lane, payload, self.export.as_ref(), &self.metrics, received_ms);
                        drained += 1;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        close(lane);
                        break;
                    }
                }
            }
        }
        drained
    }

    fn all_closed(&self) -> bool {
        self.lanes.iter().all(|lane| lane.closed)
    }
}

/// Resolves with the first lane (scanning from `start`) that has a message or has closed.
/// Every pending receiver registers the waker, so any producer wakes the router.
async fn next_ready(
    lanes: &mut [SourceLane],
    start: usize,
) -> Option<(usize, Option<RawPayload>)> {
    poll_fn(|cx| {
        let count = lanes.len();
        let mut open = 0;
        for offset in 0..count {
            let idx = (start + offset) % count;
            let lane = &mut lanes[idx];
            if lane.closed {
                continue;
            }
            open += 1;
            if let Poll::Ready(next) = lane.rx.poll_recv(cx) {
                return Poll::Ready(Some((idx, next)));
            }
        }
        if open == 0 {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    })
    .await
}

fn apply(
    lane: &SourceLane,
    payload: RawPayload,
    export: Option<&ExportQueue>,
    metrics: &IngestMetrics,
    received_ms: i64,
) {
    match decode_reading(&payload) {
        Ok(reading) => {
            lane.series
                .add(reading.value, reading.timestamp_secs(received_ms));
            metrics.inc_accepted();
            if lane.export {
                if let Some(queue) = export {
                    queue.offer(payload);
                }
            }
        }
        Err(err) => {
            metrics.inc_decode_errors();
            warn!("[ingest:{}] dropping payload: {err}", lane.metric);
        }
    }
}

fn close(lane: &mut SourceLane) {
    if !lane.closed {
        lane.closed = true;
        warn!("[ingest:{}] source channel closed", lane.metric);
    }
}
