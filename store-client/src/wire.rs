// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! JSON shapes shared by the store responses and the live feed payloads.

use core_types::StorePoint;
use serde::Deserialize;

/// The store wraps values as `{"data": <n>}`; live payloads usually carry the bare number.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum DataField {
    Number(f64),
    Nested { data: f64 },
}

impl DataField {
    pub fn value(self) -> f64 {
        match self {
            DataField::Number(v) | DataField::Nested { data: v } => v,
        }
    }
}

/// One element of a `last/{n}` response.
#[derive(Debug, Deserialize)]
pub struct StoreEntry {
    pub timestamp: i64,
    pub data: DataField,
}

impl From<StoreEntry> for StorePoint {
    fn from(entry: StoreEntry) -> Self {
        StorePoint {
            value: entry.data.value(),
            timestamp_ms: entry.timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AggregateResponse {
    pub result: f64,
}

pub fn decode_last_n(body: &[u8]) -> Result<Vec<StorePoint>, serde_json::Error> {
    let entries: Vec<StoreEntry> = serde_json::from_slice(body)?;
    Ok(entries.into_iter().map(StorePoint::from).collect())
}

pub fn decode_aggregate(body: &[u8]) -> Result<f64, serde_json::Error> {
    let parsed: AggregateResponse = serde_json::from_slice(body)?;
    Ok(parsed.result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_nested_store_entries_in_response_order() {
        let body = br#"[
            {"timestamp": 1700000002000, "data": {"data": 0.42}},
            {"timestamp": 1700000001000, "data": {"data": 0.40}}
        ]"#;
        let points = decode_last_n(body).unwrap();
        assert_eq!(
            points,
            vec![
                StorePoint { value: 0.42, timestamp_ms: 1_700_000_002_000 },
                StorePoint { value: 0.40, timestamp_ms: 1_700_000_001_000 },
            ]
        );
    }

    #[test]
    fn accepts_bare_numeric_data() {
        let points = decode_last_n(br#"[{"timestamp": 5, "data": 7}]"#).unwrap();
        assert_eq!(points[0].value, 7.0);
    }

    #[test]
    fn empty_history_is_not_an_error() {
        assert!(decode_last_n(b"[]").unwrap().is_empty());
    }

    #[test]
    fn rejects_entries_without_timestamp() {
        assert!(decode_last_n(br#"[{"data": {"data": 1}}]"#).is_err());
    }

    #[test]
    fn decodes_aggregate_result() {
        assert_eq!(decode_aggregate(br#"{"result": 12.5}"#).unwrap(), 12.5);
        assert!(decode_aggregate(br#"{"value": 1}"#).is_err());
    }
}
