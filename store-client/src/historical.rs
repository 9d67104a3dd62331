// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::time::Duration;

use async_trait::async_trait;
use core_types::{AggregateFn, StorePoint};
use log::debug;
use reqwest::{Client, Url};

use crate::{
    error::StoreError,
    wire::{decode_aggregate, decode_last_n},
};

/// Order in which a store returns `fetch_last_n` results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOrder {
    NewestFirst,
    OldestFirst,
}

#[async_trait]
pub trait HistoricalStore: Send + Sync {
    /// The last `n` points of `datasource`, in [`HistoricalStore::order`].
    async fn fetch_last_n(&self, datasource: &str, n: usize) -> Result<Vec<StorePoint>, StoreError>;

    /// Server-side aggregate over points newer than `since_ms`.
    async fn fetch_aggregate(
        &self,
        datasource: &str,
        since_ms: i64,
        func: AggregateFn,
    ) -> Result<f64, StoreError>;

    fn order(&self) -> StoreOrder {
        StoreOrder::NewestFirst
    }
}

/// JSON time-series store over HTTP (`/ts/{id}/last/{n}`, `/ts/{id}/since/{ms}/{fn}`).
#[derive(Clone)]
pub struct HttpStoreClient {
    client: Client,
    base_url: Url,
}

impl HttpStoreClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_bytes(&self, url: Url) -> Result<Vec<u8>, StoreError> {
        debug!("[store] GET {url}");
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(StoreError::Http(resp.status().as_u16()));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

#[async_trait]
impl HistoricalStore for HttpStoreClient {
    async fn fetch_last_n(&self, datasource: &str, n: usize) -> Result<Vec<StorePoint>, StoreError> {
        let n = n.to_string();
        let url = self.endpoint(&["ts", datasource, "last", &n])?;
        let body = self.get_bytes(url).await?;
        Ok(decode_last_n(&body)?)
    }

    async fn fetch_aggregate(
        &self,
        datasource: &str,
        since_ms: i64,
        func: AggregateFn,
    ) -> Result<f64, StoreError> {
        let since = since_ms.to_string();
        let url = self.endpoint(&["ts", datasource, "since", &since, func.as_path()])?;
        let body = self.get_bytes(url).await?;
        Ok(decode_aggregate(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_extend_base_path() {
        let client = HttpStoreClient::new("http://store:5555/", Duration::from_secs(1)).unwrap();
        let url = client.endpoint(&["ts", "loadavg1", "last", "500"]).unwrap();
        assert_eq!(url.as_str(), "http://store:5555/ts/loadavg1/last/500");

        let prefixed = HttpStoreClient::new("http://store:5555/api", Duration::from_secs(1)).unwrap();
        let url = prefixed
            .endpoint(&["ts", "freemem", "since", "10", AggregateFn::StdDev.as_path()])
            .unwrap();
        assert_eq!(url.as_str(), "http://store:5555/api/ts/freemem/since/10/sd");
    }

    #[test]
    fn rejects_unparseable_base_url() {
        assert!(matches!(
            HttpStoreClient::new("not a url", Duration::from_secs(1)),
            Err(StoreError::Url(_))
        ));
    }

    #[test]
    fn default_order_is_newest_first() {
        let client = HttpStoreClient::new("http://store", Duration::from_secs(1)).unwrap();
        assert_eq!(client.order(), StoreOrder::NewestFirst);
    }
}
