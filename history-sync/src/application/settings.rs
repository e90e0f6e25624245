//! Settings file
//!
//! A JSON document with camelCase keys. Every key is optional; missing keys take
//! the defaults below, so a partial file only overrides what it names.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use derivative::Derivative;
use getset::{Getters, Setters};
use serde::{Deserialize, Serialize};

use crate::{
    common::errors::{SettingsError, ValidationError},
    domain::synchronization::value_objects::{
        sample::{Aggregation, TimeWindow},
        sync_config::{SyncConfig, TargetFieldNames, UpsertMatching},
    },
    infrastructure::{checkpoint::JsonFileCheckpointStore, web::history_api::HttpHistoryFetcher},
};

#[derive(Derivative, Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[derivative(Default)]
#[getset(get = "pub", set = "pub")]
#[serde(default, rename_all = "camelCase")]
pub struct SyncSettings {
    #[derivative(Default(value = "String::from(\"http://localhost:3001\")"))]
    api_base_url: String,
    /// Sent verbatim as the `Authorization` header.
    auth_header: Option<String>,
    #[derivative(Default(value = "30"))]
    timeout_seconds: u64,
    /// `YYYY-MM-DDTHH:MM` in local time, RFC 3339, or epoch milliseconds.
    start_time: Option<String>,
    end_time: Option<String>,
    #[derivative(Default(value = "String::from(\"3600\")"))]
    interval: String,
    aggregation: Aggregation,
    #[derivative(Default(value = "String::from(\"point\")"))]
    source_field: String,
    target_fields: TargetFieldNames,
    #[derivative(Default(value = "PathBuf::from(\"history-sync.progress.json\")"))]
    checkpoint_path: PathBuf,
    #[derivative(Default(value = "500"))]
    fetch_pacing_ms: u64,
    #[derivative(Default(value = "200"))]
    write_pacing_ms: u64,
    #[derivative(Default(value = "10"))]
    checkpoint_every: usize,
    #[derivative(Default(value = "24"))]
    staleness_hours: i64,
    utc_offset_minutes: Option<i32>,
    upsert_matching: UpsertMatching,
}

impl SyncSettings {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SettingsError::Io {
                path: path.display().to_string(),
                source,
            })?;
        serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Validates the window and builds the engine configuration.
    pub fn to_config(&self) -> Result<SyncConfig, ValidationError> {
        let start = self.start_time.as_deref().map(parse_time).transpose()?;
        let end = self.end_time.as_deref().map(parse_time).transpose()?;
        let window = TimeWindow::new(start.flatten(), end.flatten())?;

        Ok(SyncConfig::new()
            .with_window(*window.start(), *window.end())
            .with_interval_seconds(self.interval.clone())
            .with_aggregation(self.aggregation)
            .with_source_field(self.source_field.clone())
            .with_target_fields(self.target_fields.clone())
            .with_fetch_pacing(Duration::from_millis(self.fetch_pacing_ms))
            .with_write_pacing(Duration::from_millis(self.write_pacing_ms))
            .with_checkpoint_every(self.checkpoint_every)
            .with_utc_offset_minutes(self.utc_offset_minutes)
            .with_upsert_matching(self.upsert_matching))
    }

    pub fn fetcher(&self) -> Result<HttpHistoryFetcher, ValidationError> {
        HttpHistoryFetcher::new(
            &self.api_base_url,
            self.auth_header.as_deref(),
            Some(Duration::from_secs(self.timeout_seconds)),
        )
    }

    pub fn checkpoint_store(&self) -> JsonFileCheckpointStore {
        JsonFileCheckpointStore::with_staleness(
            &self.checkpoint_path,
            chrono::Duration::hours(self.staleness_hours.max(1)),
        )
    }
}

/// Blank input means "not set".
fn parse_time(raw: &str) -> Result<Option<i64>, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ValidationError::InvalidTimestamp(raw.to_string()));
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(instant.timestamp_millis()));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|_| ValidationError::InvalidTimestamp(raw.to_string()))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|instant| Some(instant.timestamp_millis()))
        .ok_or_else(|| ValidationError::InvalidTimestamp(raw.to_string()))
}
