//! Checkpoint Store
//! Persists run progress so a paused or interrupted run can pick up where it left off.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::warn;

use crate::common::errors::CheckpointError;

use super::sync_progress::SyncProgress;

/// Checkpoints older than this are discarded on load.
pub const DEFAULT_STALENESS_HOURS: i64 = 24;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, progress: &SyncProgress) -> Result<(), CheckpointError>;

    /// `None` when nothing was saved, the blob is unreadable, or it is stale.
    async fn load(&self) -> Result<Option<SyncProgress>, CheckpointError>;

    async fn clear(&self) -> Result<(), CheckpointError>;
}

pub fn encode(progress: &SyncProgress) -> Result<String, CheckpointError> {
    Ok(serde_json::to_string(progress)?)
}

/// Outcome of decoding a stored blob.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    Fresh(SyncProgress),
    Stale,
    Corrupt,
}

pub fn decode(blob: &str, staleness: Duration) -> Decoded {
    let progress: SyncProgress = match serde_json::from_str(blob) {
        Ok(progress) => progress,
        Err(e) => {
            warn!("Saved progress could not be read and will be discarded: {}", e);
            return Decoded::Corrupt;
        }
    };
    let age = Utc::now().timestamp_millis() - progress.saved_at;
    if age > staleness.num_milliseconds() {
        return Decoded::Stale;
    }
    Decoded::Fresh(progress.sanitized())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_reject_progress_older_than_the_window() {
        let mut progress = SyncProgress::with_snapshot(vec!["r1".into()]);
        progress.saved_at = Utc::now().timestamp_millis() - Duration::hours(25).num_milliseconds();
        let blob = encode(&progress).unwrap();
        assert_eq!(decode(&blob, Duration::hours(24)), Decoded::Stale);
    }

    #[test]
    fn it_should_accept_recent_progress() {
        let mut progress = SyncProgress::with_snapshot(vec!["r1".into(), "r2".into()]);
        progress.current_index = 1;
        progress.saved_at = Utc::now().timestamp_millis() - 1_000;
        let blob = encode(&progress).unwrap();
        assert_eq!(decode(&blob, Duration::hours(24)), Decoded::Fresh(progress));
    }

    #[test]
    fn it_should_flag_garbage_as_corrupt() {
        assert_eq!(decode("{not json", Duration::hours(24)), Decoded::Corrupt);
    }
}
