// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! In-memory sliding windows of recent metric readings.
//!
//! The crate exposes:
//! - [`BoundedSeries`]: fixed-capacity (value, timestamp) buffer with FIFO eviction, guarded by one
//!   read-write lock that callers never see.
//! - [`SeriesRegistry`]: the fixed set of series created at startup, keyed by [`MetricId`].
//! - [`SnapshotReader`]: read path handing consistent copies to renderers and exporters.
//!
//! [`MetricId`]: core_types::MetricId

pub mod error;
pub mod registry;
pub mod series;
pub mod snapshot;

pub use error::{Result, SeriesError};
pub use registry::SeriesRegistry;
pub use series::BoundedSeries;
pub use snapshot::{SeriesSnapshot, SnapshotReader};
