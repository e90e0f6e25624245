use async_trait::async_trait;
use chrono::Duration;
use log::info;
use tokio::sync::Mutex;

use crate::{
    common::errors::CheckpointError,
    domain::synchronization::{
        checkpoint::{decode, encode, CheckpointStore, Decoded, DEFAULT_STALENESS_HOURS},
        sync_progress::SyncProgress,
    },
};

/// Keeps the serialized blob in memory. Lives as long as the process.
#[derive(Debug)]
pub struct MemoryCheckpointStore {
    blob: Mutex<Option<String>>,
    staleness: Duration,
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::with_staleness(Duration::hours(DEFAULT_STALENESS_HOURS))
    }

    pub fn with_staleness(staleness: Duration) -> Self {
        Self {
            blob: Mutex::new(None),
            staleness,
        }
    }

    /// Raw access for inspection and for seeding hand-written blobs.
    pub async fn raw(&self) -> Option<String> {
        self.blob.lock().await.clone()
    }

    pub async fn put_raw(&self, blob: impl Into<String>) {
        *self.blob.lock().await = Some(blob.into());
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, progress: &SyncProgress) -> Result<(), CheckpointError> {
        let encoded = encode(progress)?;
        *self.blob.lock().await = Some(encoded);
        Ok(())
    }

    async fn load(&self) -> Result<Option<SyncProgress>, CheckpointError> {
        let mut guard = self.blob.lock().await;
        let Some(blob) = guard.as_deref() else {
            return Ok(None);
        };
        match decode(blob, self.staleness) {
            Decoded::Fresh(progress) => Ok(Some(progress)),
            Decoded::Stale => {
                info!("Saved progress is older than {}h, discarding", self.staleness.num_hours());
                *guard = None;
                Ok(None)
            }
            Decoded::Corrupt => {
                *guard = None;
                Ok(None)
            }
        }
    }

    async fn clear(&self) -> Result<(), CheckpointError> {
        *self.blob.lock().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn it_should_round_trip_fresh_progress() {
        let store = MemoryCheckpointStore::new();
        let mut progress = SyncProgress::with_snapshot(vec!["a".into(), "b".into()]);
        progress.current_index = 1;
        progress.saved_at = Utc::now().timestamp_millis() - 1_000;
        store.save(&progress).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(progress));
    }

    #[tokio::test]
    async fn it_should_discard_stale_and_corrupt_blobs() {
        let store = MemoryCheckpointStore::new();
        let mut progress = SyncProgress::with_snapshot(vec!["a".into()]);
        progress.saved_at = Utc::now().timestamp_millis() - Duration::hours(25).num_milliseconds();
        store.save(&progress).await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        assert_eq!(store.raw().await, None);

        store.put_raw("][").await;
        assert_eq!(store.load().await.unwrap(), None);
        assert_eq!(store.raw().await, None);
    }

    #[tokio::test]
    async fn it_should_never_restore_an_in_flight_write() {
        let store = MemoryCheckpointStore::new();
        let mut progress = SyncProgress::with_snapshot(vec!["a".into()]);
        progress.is_writing = true;
        progress.touch();
        store.save(&progress).await.unwrap();

        let restored = store.load().await.unwrap().unwrap();
        assert!(!restored.is_writing);
    }
}
