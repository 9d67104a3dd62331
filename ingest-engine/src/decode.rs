// Copyright (c) James Kassemi, SC, US. All rights reserved.

use core_types::Reading;
use serde::Deserialize;
use store_client::wire::DataField;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct LivePayload {
    data: DataField,
    /// Unix milliseconds, when the source stamps its readings.
    #[serde(default)]
    timestamp: Option<i64>,
}

/// Decodes one live frame: `{"data": <number>}` with an optional `"timestamp"` in milliseconds.
pub fn decode_reading(payload: &[u8]) -> Result<Reading, DecodeError> {
    let parsed: LivePayload = serde_json::from_slice(payload)?;
    Ok(Reading {
        value: parsed.data.value(),
        timestamp_ms: parsed.timestamp,
    })
}
