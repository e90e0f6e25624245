use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::Duration;
use getset::Getters;
use log::{debug, info};
use tokio::fs;

use crate::{
    common::errors::CheckpointError,
    domain::synchronization::{
        checkpoint::{decode, encode, CheckpointStore, Decoded, DEFAULT_STALENESS_HOURS},
        sync_progress::SyncProgress,
    },
};

/// Stores the checkpoint blob in a single JSON file, surviving process restarts.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct JsonFileCheckpointStore {
    path: PathBuf,
    staleness: Duration,
}

impl JsonFileCheckpointStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_staleness(path, Duration::hours(DEFAULT_STALENESS_HOURS))
    }

    pub fn with_staleness(path: impl AsRef<Path>, staleness: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            staleness,
        }
    }

    async fn remove_file(&self) -> Result<(), CheckpointError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CheckpointStore for JsonFileCheckpointStore {
    async fn save(&self, progress: &SyncProgress) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, encode(progress)?).await?;
        debug!("Progress saved to {}", self.path.display());
        Ok(())
    }

    async fn load(&self) -> Result<Option<SyncProgress>, CheckpointError> {
        let blob = match fs::read_to_string(&self.path).await {
            Ok(blob) => blob,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match decode(&blob, self.staleness) {
            Decoded::Fresh(progress) => Ok(Some(progress)),
            Decoded::Stale => {
                info!(
                    "Progress in {} is older than {}h, discarding",
                    self.path.display(),
                    self.staleness.num_hours()
                );
                self.remove_file().await?;
                Ok(None)
            }
            Decoded::Corrupt => {
                self.remove_file().await?;
                Ok(None)
            }
        }
    }

    async fn clear(&self) -> Result<(), CheckpointError> {
        self.remove_file().await
    }
}
