// Copyright (c) James Kassemi, SC, US. All rights reserved.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {0}")]
    Http(u16),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StoreError {
    /// True when the store could not be reached at all, as opposed to answering badly.
    pub fn is_unreachable(&self) -> bool {
        match self {
            StoreError::Request(err) => err.is_connect() || err.is_timeout(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ObserveError {
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("connect timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {0}")]
    Http(u16),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}
