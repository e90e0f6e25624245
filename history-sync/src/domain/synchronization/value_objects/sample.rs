//! Samples and History Queries

use std::{collections::HashMap, fmt};

use getset::Getters;
use serde::{Deserialize, Serialize};

use crate::common::errors::ValidationError;
use crate::domain::synchronization::identifier::CanonicalId;

use super::cell_value::Scalar;

/// One timestamped measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub value: Scalar,
}

impl Sample {
    pub fn new(timestamp: i64, value: impl Into<Scalar>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }
}

/// Samples keyed by the identifier they were requested for.
pub type HistoryBatch = HashMap<CanonicalId, Vec<Sample>>;

/// Server-side aggregation applied over each interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    None,
    Avg,
    Sum,
    Max,
    Min,
    Count,
}

impl Aggregation {
    /// Value of the `function` request field.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Aggregation::None => "",
            Aggregation::Avg => "avg",
            Aggregation::Sum => "sum",
            Aggregation::Max => "max",
            Aggregation::Min => "min",
            Aggregation::Count => "count",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Aggregation::None => f.write_str("none"),
            other => f.write_str(other.as_wire()),
        }
    }
}

/// Half-open window in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct TimeWindow {
    start: i64,
    end: i64,
}

impl TimeWindow {
    pub fn new(start: Option<i64>, end: Option<i64>) -> Result<Self, ValidationError> {
        match (start, end) {
            (Some(start), Some(end)) if start > 0 && end > 0 => {
                if start >= end {
                    return Err(ValidationError::InvertedTimeWindow { start, end });
                }
                Ok(Self { start, end })
            }
            _ => Err(ValidationError::MissingTimeWindow),
        }
    }
}

/// A validated request for history samples.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct HistoryQuery {
    identifiers: Vec<CanonicalId>,
    window: TimeWindow,
    interval_seconds: String,
    aggregation: Aggregation,
}

impl HistoryQuery {
    pub fn new(
        identifiers: Vec<CanonicalId>,
        window: TimeWindow,
        interval_seconds: impl Into<String>,
        aggregation: Aggregation,
    ) -> Result<Self, ValidationError> {
        if identifiers.is_empty() {
            return Err(ValidationError::EmptyIdentifierList);
        }
        Ok(Self {
            identifiers,
            window,
            interval_seconds: interval_seconds.into(),
            aggregation,
        })
    }

    /// Same window and options, different identifiers.
    pub fn for_identifiers(&self, identifiers: Vec<CanonicalId>) -> Result<Self, ValidationError> {
        Self::new(
            identifiers,
            self.window,
            self.interval_seconds.clone(),
            self.aggregation,
        )
    }
}
