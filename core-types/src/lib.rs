// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Shared metric identifiers, reading types, configuration, and retry policy for the os monitor.

pub mod config;
pub mod retry;
pub mod types;

pub use config::{ConfigError, MonitorConfig};
pub use types::{AggregateFn, MetricId, Reading, StorePoint, millis_to_secs, now_millis};
