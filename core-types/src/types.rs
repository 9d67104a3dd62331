// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{borrow::Borrow, fmt, sync::Arc};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Stable identifier of a monitored metric (e.g. `loadavg1`, `freemem`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricId(Arc<str>);

impl MetricId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MetricId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MetricId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl Borrow<str> for MetricId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A decoded live reading. Timestamps are unix milliseconds; `None` means the
/// source did not carry one and the receiver stamps it on arrival.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub value: f64,
    pub timestamp_ms: Option<i64>,
}

impl Reading {
    /// Seconds to store, falling back to `received_ms` when the payload had no timestamp.
    pub fn timestamp_secs(&self, received_ms: i64) -> i64 {
        millis_to_secs(self.timestamp_ms.unwrap_or(received_ms))
    }
}

/// One historical point as returned by the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorePoint {
    pub value: f64,
    pub timestamp_ms: i64,
}

/// Aggregations the historical store computes server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    Min,
    Max,
    #[serde(rename = "sd")]
    StdDev,
}

impl AggregateFn {
    pub fn as_path(&self) -> &'static str {
        match self {
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::StdDev => "sd",
        }
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}

pub fn millis_to_secs(ms: i64) -> i64 {
    ms.div_euclid(1_000)
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
