//! HTTP History Fetcher
//! Talks to the provider's point-data search endpoint (directly or through the
//! forwarding proxy, which exposes the same path).

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use getset::Getters;
use log::{debug, error, info};
use reqwest::{header::HeaderMap, Client};
use serde_json::Value;
use url::Url;

use crate::{
    common::errors::{TransportError, ValidationError},
    domain::synchronization::{
        history_fetcher::HistoryFetcher,
        value_objects::sample::{Aggregation, HistoryBatch, HistoryQuery, TimeWindow},
    },
};

use super::{
    request::{build_headers, build_search_request, search_endpoint},
    wire::decode_history,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct HttpHistoryFetcher {
    endpoint: Url,
    #[getset(skip)]
    headers: HeaderMap,
    #[getset(skip)]
    http_client: Client,
}

impl HttpHistoryFetcher {
    pub fn new(
        base_url: &str,
        auth_header: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Self, ValidationError> {
        let endpoint = search_endpoint(base_url)?;
        let mut raw_headers = HashMap::new();
        if let Some(auth) = auth_header.filter(|a| !a.trim().is_empty()) {
            raw_headers.insert("Authorization".to_string(), auth.to_string());
        }
        let http_client = Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| ValidationError::InvalidEndpoint(e.to_string()))?;
        Ok(Self {
            endpoint,
            headers: build_headers(&raw_headers),
            http_client,
        })
    }

    /// Queries the last hour for a placeholder point to check reachability and credentials.
    pub async fn probe(&self) -> Result<(), TransportError> {
        let now = Utc::now().timestamp_millis();
        let window = TimeWindow::new(Some(now - 3_600_000), Some(now))
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let query = HistoryQuery::new(vec!["test".to_string()], window, "3600", Aggregation::None)
            .map_err(|e| TransportError::Network(e.to_string()))?;
        self.fetch(&query).await.map(|_| ())
    }
}

#[async_trait]
impl HistoryFetcher for HttpHistoryFetcher {
    async fn fetch(&self, query: &HistoryQuery) -> Result<HistoryBatch, TransportError> {
        debug!(
            "POST {} for {} point(s) between {} and {}",
            self.endpoint,
            query.identifiers().len(),
            query.window().start(),
            query.window().end()
        );
        let response = build_search_request(
            &self.http_client,
            &self.endpoint,
            self.headers.clone(),
            query,
        )
        .send()
        .await
        .map_err(|e| {
            error!("History request to {} failed: {}", self.endpoint, e);
            TransportError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!("History API answered {}: {}", status, detail);
            return Err(TransportError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let body: Value = response.json().await?;
        let batch = decode_history(body, query.identifiers())?;
        info!(
            "Received samples for {}/{} point(s)",
            batch.len(),
            query.identifiers().len()
        );
        Ok(batch)
    }
}
