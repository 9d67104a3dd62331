// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::ExportError;

#[async_trait]
pub trait ExportSink: Send + Sync {
    async fn export(&self, payload: &[u8]) -> Result<(), ExportError>;
}

/// Posts raw payloads to an HTTP endpoint, wrapped as a JSON string.
#[derive(Clone)]
pub struct HttpExportSink {
    client: Client,
    url: String,
}

impl HttpExportSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ExportError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

pub fn encode_export_body(payload: &[u8]) -> Result<String, ExportError> {
    Ok(serde_json::to_string(&String::from_utf8_lossy(payload))?)
}

#[async_trait]
impl ExportSink for HttpExportSink {
    async fn export(&self, payload: &[u8]) -> Result<(), ExportError> {
        let body = encode_export_body(payload)?;
        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ExportError::Http(resp.status().as_u16()));
        }
        Ok(())
    }
}
