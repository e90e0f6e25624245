use std::time::Duration;

use derivative::Derivative;
use getset::Getters;
use serde::{Deserialize, Serialize};

use crate::common::errors::ValidationError;

use super::sample::{Aggregation, TimeWindow};

/// Names of the four text fields written into the target table.
#[derive(Derivative, Debug, PartialEq, Eq, Clone, Getters, Serialize, Deserialize)]
#[derivative(Default)]
#[getset(get = "pub")]
#[serde(default)]
pub struct TargetFieldNames {
    #[derivative(Default(value = "String::from(\"point\")"))]
    point: String,
    #[derivative(Default(value = "String::from(\"timestamp\")"))]
    timestamp: String,
    #[derivative(Default(value = "String::from(\"time\")"))]
    time: String,
    #[derivative(Default(value = "String::from(\"value\")"))]
    value: String,
}

impl TargetFieldNames {
    pub fn new(
        point: impl Into<String>,
        timestamp: impl Into<String>,
        time: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            point: point.into(),
            timestamp: timestamp.into(),
            time: time.into(),
            value: value.into(),
        }
    }

    pub fn all(&self) -> [&str; 4] {
        [&self.point, &self.timestamp, &self.time, &self.value]
    }
}

/// How existing target rows are matched against incoming samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertMatching {
    /// Scan every target row for every sample.
    LinearScan,
    /// Scan once per identifier and look samples up by `(point, timestamp)`.
    #[default]
    KeyIndex,
}

#[derive(Derivative, Debug, PartialEq, Eq, Clone, Getters)]
#[derivative(Default)]
#[getset(get = "pub")]
pub struct SyncConfig {
    window_start: Option<i64>,
    window_end: Option<i64>,
    #[derivative(Default(value = "String::from(\"3600\")"))]
    interval_seconds: String,
    aggregation: Aggregation,
    #[derivative(Default(value = "String::from(\"point\")"))]
    source_field: String,
    target_fields: TargetFieldNames,
    #[derivative(Default(value = "Duration::from_millis(500)"))]
    fetch_pacing: Duration,
    #[derivative(Default(value = "Duration::from_millis(200)"))]
    write_pacing: Duration,
    #[derivative(Default(value = "10"))]
    checkpoint_every: usize,
    utc_offset_minutes: Option<i32>,
    upsert_matching: UpsertMatching,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(&self) -> Result<TimeWindow, ValidationError> {
        TimeWindow::new(self.window_start, self.window_end)
    }

    pub fn with_window(mut self, start: i64, end: i64) -> Self {
        self.window_start = Some(start);
        self.window_end = Some(end);
        self
    }

    pub fn with_interval_seconds(mut self, interval_seconds: impl Into<String>) -> Self {
        self.interval_seconds = interval_seconds.into();
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_source_field(mut self, source_field: impl Into<String>) -> Self {
        self.source_field = source_field.into();
        self
    }

    pub fn with_target_fields(mut self, target_fields: TargetFieldNames) -> Self {
        self.target_fields = target_fields;
        self
    }

    pub fn with_fetch_pacing(mut self, fetch_pacing: Duration) -> Self {
        self.fetch_pacing = fetch_pacing;
        self
    }

    pub fn with_write_pacing(mut self, write_pacing: Duration) -> Self {
        self.write_pacing = write_pacing;
        self
    }

    /// Zero is treated as one: persist after every row.
    pub fn with_checkpoint_every(mut self, checkpoint_every: usize) -> Self {
        self.checkpoint_every = checkpoint_every.max(1);
        self
    }

    pub fn with_utc_offset_minutes(mut self, utc_offset_minutes: Option<i32>) -> Self {
        self.utc_offset_minutes = utc_offset_minutes;
        self
    }

    pub fn with_upsert_matching(mut self, upsert_matching: UpsertMatching) -> Self {
        self.upsert_matching = upsert_matching;
        self
    }

    /// No pacing at all, for tests and local replays.
    pub fn without_pacing(self) -> Self {
        self.with_fetch_pacing(Duration::ZERO)
            .with_write_pacing(Duration::ZERO)
    }
}
