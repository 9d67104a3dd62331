// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Fire-and-forget mirroring of one metric's raw payloads.

use std::sync::Arc;

use log::{debug, warn};
use store_client::{ExportSink, RawPayload};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::metrics::IngestMetrics;

/// Non-blocking handoff from the router to the exporter worker.
#[derive(Clone)]
pub struct ExportQueue {
    tx: mpsc::Sender<RawPayload>,
    metrics: IngestMetrics,
}

impl ExportQueue {
    /// Never waits: a full or closed queue drops the payload.
    pub fn offer(&self, payload: RawPayload) {
        match self.tx.try_send(payload) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.metrics.inc_export_dropped();
                debug!("[export] queue full; payload dropped");
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.inc_export_dropped();
                debug!("[export] worker gone; payload dropped");
            }
        }
    }
}

/// Starts the worker that owns `sink`. Each payload gets one delivery attempt.
pub fn spawn_exporter(
    sink: Arc<dyn ExportSink>,
    capacity: usize,
    metrics: IngestMetrics,
    cancel: CancellationToken,
) -> (ExportQueue, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<RawPayload>(capacity.max(1));
    let worker_metrics = metrics.clone();
    let handle = tokio::spawn(async move {
        loop {
            let payload = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(payload) => payload,
                    None => break,
                },
            };
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = sink.export(&payload) => outcome,
            };
            match outcome {
                Ok(()) => worker_metrics.inc_export_sent(),
                Err(err) => {
                    worker_metrics.inc_export_failed();
                    warn!("[export] delivery failed: {err}");
                }
            }
        }
    });
    (ExportQueue { tx, metrics }, handle)
}
