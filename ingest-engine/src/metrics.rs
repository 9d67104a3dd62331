// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Default)]
struct IngestMetricsInner {
    accepted: AtomicU64,
    decode_errors: AtomicU64,
    export_sent: AtomicU64,
    export_failed: AtomicU64,
    export_dropped: AtomicU64,
    idle_iterations: AtomicU64,
}

/// Counters shared by the router, the exporter worker, and the `/metrics` handler.
#[derive(Clone, Default)]
pub struct IngestMetrics {
    inner: Arc<IngestMetricsInner>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestMetricsSnapshot {
    pub accepted: u64,
    pub decode_errors: u64,
    pub export_sent: u64,
    pub export_failed: u64,
    pub export_dropped: u64,
    pub idle_iterations: u64,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_accepted(&self) {
        self.inner.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_decode_errors(&self) {
        self.inner.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_export_sent(&self) {
        self.inner.export_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_export_failed(&self) {
        self.inner.export_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_export_dropped(&self) {
        self.inner.export_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_idle(&self) {
        self.inner.idle_iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestMetricsSnapshot {
        IngestMetricsSnapshot {
            accepted: self.inner.accepted.load(Ordering::Relaxed),
            decode_errors: self.inner.decode_errors.load(Ordering::Relaxed),
            export_sent: self.inner.export_sent.load(Ordering::Relaxed),
            export_failed: self.inner.export_failed.load(Ordering::Relaxed),
            export_dropped: self.inner.export_dropped.load(Ordering::Relaxed),
            idle_iterations: self.inner.idle_iterations.load(Ordering::Relaxed),
        }
    }
}
