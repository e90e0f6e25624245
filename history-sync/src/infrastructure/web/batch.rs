//! Batched history queries
//! Large identifier lists are split into chunks and queried one chunk at a time.

use std::time::Duration;

use log::{debug, info};
use tokio::time::sleep;

use crate::{
    common::errors::{SyncError, ValidationError},
    domain::synchronization::{
        history_fetcher::HistoryFetcher,
        identifier::CanonicalId,
        value_objects::sample::{HistoryBatch, HistoryQuery},
    },
};

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_BATCH_GAP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// 1-based number of the batch that just finished.
    pub current: usize,
    pub total: usize,
    pub processed: usize,
    pub total_items: usize,
}

/// Consecutive chunks of at most `batch_size`; only the last may be shorter.
pub fn chunk_identifiers(
    identifiers: &[CanonicalId],
    batch_size: usize,
) -> Result<Vec<Vec<CanonicalId>>, ValidationError> {
    if batch_size == 0 {
        return Err(ValidationError::InvalidBatchSize);
    }
    Ok(identifiers
        .chunks(batch_size)
        .map(|chunk| chunk.to_vec())
        .collect())
}

/// Issues one request per chunk, strictly sequentially, and merges the results.
/// The first failing chunk aborts the whole call.
pub async fn fetch_in_batches<F, P>(
    fetcher: &F,
    identifiers: &[CanonicalId],
    template: &HistoryQuery,
    batch_size: usize,
    gap: Duration,
    mut on_progress: P,
) -> Result<HistoryBatch, SyncError>
where
    F: HistoryFetcher + ?Sized,
    P: FnMut(BatchProgress),
{
    let chunks = chunk_identifiers(identifiers, batch_size)?;
    let total = chunks.len();
    let total_items = identifiers.len();
    info!(
        "Querying {} point(s) in {} batch(es) of up to {}",
        total_items, total, batch_size
    );

    let mut merged = HistoryBatch::new();
    let mut processed = 0;
    for (i, chunk) in chunks.into_iter().enumerate() {
        processed += chunk.len();
        let query = template.for_identifiers(chunk)?;
        let result = fetcher.fetch(&query).await?;
        debug!("Batch {}/{} returned {} point(s)", i + 1, total, result.len());
        merged.extend(result);

        on_progress(BatchProgress {
            current: i + 1,
            total,
            processed,
            total_items,
        });

        if i + 1 < total && !gap.is_zero() {
            sleep(gap).await;
        }
    }
    Ok(merged)
}
