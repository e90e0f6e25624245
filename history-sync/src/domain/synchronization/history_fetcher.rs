//! History Fetcher
//! Boundary to the remote history-data provider.

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::common::errors::TransportError;

use super::value_objects::sample::{HistoryBatch, HistoryQuery};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait HistoryFetcher: Send + Sync {
    /// Returns samples per requested identifier. Identifiers the provider knows
    /// nothing about are absent from the result.
    async fn fetch(&self, query: &HistoryQuery) -> Result<HistoryBatch, TransportError>;
}
