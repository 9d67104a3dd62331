// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Clients for the collaborators around the series store: the historical time-series store, the
//! live per-metric websocket feeds, and the export endpoint.

pub mod error;
pub mod export;
pub mod historical;
pub mod observe;
pub mod wire;

pub use error::{ExportError, ObserveError, StoreError};
pub use export::{ExportSink, HttpExportSink};
pub use historical::{HistoricalStore, HttpStoreClient, StoreOrder};
pub use observe::{LiveSource, RawPayload, SourceHandle, WsObserver};
