// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Lifecycle contract for long-running background engines owned by the monitor process.

use serde::Serialize;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

pub trait Engine: Send + Sync {
    /// Short name used in logs and the status endpoint.
    fn label(&self) -> &str;
    fn start(&self) -> EngineResult<()>;
    fn stop(&self) -> EngineResult<()>;
    fn health(&self) -> EngineHealth;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Starting,
    Ready,
    Degraded,
    Failed,
    Stopped,
}

#[derive(Clone, Debug, Serialize)]
pub struct EngineHealth {
    pub status: HealthStatus,
    pub detail: Option<String>,
}

impl EngineHealth {
    pub fn new(status: HealthStatus, detail: Option<String>) -> Self {
        Self { status, detail }
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.status,
            HealthStatus::Starting | HealthStatus::Ready | HealthStatus::Degraded
        )
    }
}

impl Default for EngineHealth {
    fn default() -> Self {
        Self::new(HealthStatus::Stopped, None)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine already running")]
    AlreadyRunning,
    #[error("engine is not running")]
    NotRunning,
    #[error("engine failed: {source}")]
    Failure {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl EngineError {
    pub fn failure(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        EngineError::Failure {
            source: Box::new(err),
        }
    }
}
