// Copyright (c) James Kassemi, SC, US. All rights reserved.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SeriesError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeriesError {
    #[error("unknown metric '{id}'")]
    UnknownMetric { id: String },
    #[error("metric '{id}' registered twice")]
    DuplicateMetric { id: String },
    #[error("series capacity must be positive")]
    ZeroCapacity,
}
