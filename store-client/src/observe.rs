// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Live per-metric feeds over websocket.

use std::time::Duration;

use async_trait::async_trait;
use core_types::{MetricId, retry::RetryPolicy};
use futures::StreamExt;
use log::{info, warn};
use tokio::{
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::ObserveError;

/// Undecoded frame exactly as the source delivered it.
pub type RawPayload = Vec<u8>;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Running subscription for one metric.
pub struct SourceHandle {
    pub task: JoinHandle<()>,
    /// Whether the first connection attempt succeeded; otherwise the task keeps retrying.
    pub connected: bool,
}

/// Producer of raw payloads for one metric's channel.
#[async_trait]
pub trait LiveSource: Send + Sync {
    async fn open(
        &self,
        metric: MetricId,
        datasource: String,
        tx: mpsc::Sender<RawPayload>,
        cancel: CancellationToken,
    ) -> SourceHandle;
}

/// Subscribes to `{base}/ts/{datasource}/observe` and forwards every data frame into a channel.
#[derive(Debug, Clone)]
pub struct WsObserver {
    base_url: Url,
    retry: RetryPolicy,
    connect_timeout: Duration,
}

impl WsObserver {
    pub fn new(base_url: &str) -> Result<Self, ObserveError> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            retry: RetryPolicy::reconnect(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Deadline for one connect attempt, handshake included.
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn observe_url(&self, datasource: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&format!("/ts/{datasource}/observe"));
        url
    }

    /// One connection attempt; used at startup to tell an unreachable source from a slow one.
    pub async fn connect(&self, datasource: &str) -> Result<WsStream, ObserveError> {
        let url = self.observe_url(datasource);
        match timeout(self.connect_timeout, connect_async(url.as_str())).await {
            Ok(connected) => Ok(connected?.0),
            Err(_) => Err(ObserveError::Timeout(self.connect_timeout)),
        }
    }

    /// Spawns the forwarding task. With `initial == None` it starts by reconnecting.
    pub fn spawn_forwarder(
        &self,
        metric: MetricId,
        datasource: String,
        initial: Option<WsStream>,
        tx: mpsc::Sender<RawPayload>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let observer = self.clone();
        tokio::spawn(async move {
            observer
                .forward(metric, datasource, initial, tx, cancel)
                .await;
        })
    }

    async fn forward(
        self,
        metric: MetricId,
        datasource: String,
        mut stream: Option<WsStream>,
        tx: mpsc::Sender<RawPayload>,
        cancel: CancellationToken,
    ) {
        let mut attempt = 0usize;
        loop {
            let mut ws = match stream.take() {
                Some(ws) => ws,
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = sleep(self.retry.delay_for(attempt)) => {}
                    }
                    let connected = tokio::select! {
                        _ = cancel.cancelled() => return,
                        connected = self.connect(&datasource) => connected,
                    };
                    match connected {
                        Ok(ws) => {
                            info!("[observe:{metric}] connected");
                            ws
                        }
                        Err(err) => {
                            attempt = attempt.saturating_add(1);
                            warn!("[observe:{metric}] connect attempt {attempt} failed: {err}");
                            continue;
                        }
                    }
                }
            };
            attempt = 0;
            loop {
                let frame = tokio::select! {
                    _ = cancel.cancelled() => return,
                    frame = ws.next() => frame,
                };
                let payload = match frame {
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(bytes))) => bytes,
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("[observe:{metric}] stream closed; reconnecting");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        warn!("[observe:{metric}] stream error: {err}; reconnecting");
                        break;
                    }
                };
                let sent = tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = tx.send(payload) => sent,
                };
                if sent.is_err() {
                    info!("[observe:{metric}] receiver dropped; stopping");
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl LiveSource for WsObserver {
    async fn open(
        &self,
        metric: MetricId,
        datasource: String,
        tx: mpsc::Sender<RawPayload>,
        cancel: CancellationToken,
    ) -> SourceHandle {
        let initial = match self.connect(&datasource).await {
            Ok(ws) => {
                info!("[observe:{metric}] connected to {}", self.observe_url(&datasource));
                Some(ws)
            }
            Err(err) => {
                warn!("[observe:{metric}] initial connect failed: {err}; retrying in background");
                None
            }
        };
        let connected = initial.is_some();
        let task = self.spawn_forwarder(metric, datasource, initial, tx, cancel);
        SourceHandle { task, connected }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_url_targets_datasource() {
        let observer = WsObserver::new("ws://store:5555").unwrap();
        assert_eq!(
            observer.observe_url("loadavg5").as_str(),
            "ws://store:5555/ts/loadavg5/observe"
        );
    }

    #[test]
    fn rejects_bad_base_url() {
        assert!(matches!(WsObserver::new("::"), Err(ObserveError::Url(_))));
    }

    #[tokio::test]
    async fn cancelled_forwarder_exits_without_connection() {
        let observer = WsObserver::new("ws://127.0.0.1:9").unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let handle =
            observer.spawn_forwarder(MetricId::new("freemem"), "freemem".into(), None, tx, cancel);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn stalled_handshake_times_out_and_reports_disconnected() {
        // Accepted by the kernel backlog but never answered.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let observer = WsObserver::new(&format!("ws://{addr}"))
            .unwrap()
            .with_connect_timeout(Duration::from_millis(100));

        let err = observer.connect("loadavg1").await.unwrap_err();
        assert!(matches!(err, ObserveError::Timeout(d) if d == Duration::from_millis(100)));

        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let started = std::time::Instant::now();
        let handle = observer
            .open(MetricId::new("loadavg1"), "loadavg1".into(), tx, cancel.clone())
            .await;
        assert!(!handle.connected);
        assert!(started.elapsed() < Duration::from_secs(2));
        cancel.cancel();
        handle.task.await.unwrap();
        drop(listener);
    }
}
