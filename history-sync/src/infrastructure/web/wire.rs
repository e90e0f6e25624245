//! Provider wire shapes
//!
//! The history endpoint answers either `{ "data": { id: [...] } }` or the bare
//! mapping. Each sample is `{ "timestamp": .., "value": .. }` or `[timestamp, value]`.

use log::warn;
use serde_json::Value;

use crate::{
    common::errors::TransportError,
    domain::synchronization::{
        identifier::CanonicalId,
        value_objects::{
            cell_value::Scalar,
            sample::{HistoryBatch, Sample},
        },
    },
};

/// Strips the optional `data` envelope.
pub fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(data) if is_truthy(&data) => data,
            Some(data) => {
                map.insert("data".to_string(), data);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => other,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Decodes the samples of each requested identifier. Other keys in the payload
/// (status fields, unrequested points) are ignored and a missing identifier is
/// simply absent. An identifier whose list cannot be read is logged and left out;
/// the response only fails when no requested identifier could be read.
pub fn decode_history(body: Value, requested: &[CanonicalId]) -> Result<HistoryBatch, TransportError> {
    let mut mapping = match unwrap_envelope(body) {
        Value::Object(map) => map,
        Value::Null => return Ok(HistoryBatch::new()),
        other => {
            return Err(TransportError::MalformedPayload(format!(
                "expected an object keyed by point id, got {}",
                type_name(&other)
            )))
        }
    };

    let mut batch = HistoryBatch::with_capacity(requested.len());
    let mut malformed = Vec::new();
    for identifier in requested {
        let Some(entries) = mapping.remove(identifier.as_str()) else {
            continue;
        };
        match decode_entries(identifier, entries) {
            Ok(samples) => {
                batch.insert(identifier.clone(), samples);
            }
            Err(reason) => {
                warn!("Dropping history for {}: {}", identifier, reason);
                malformed.push(reason);
            }
        }
    }

    if batch.is_empty() && !malformed.is_empty() {
        return Err(TransportError::MalformedPayload(malformed.join("; ")));
    }
    Ok(batch)
}

fn decode_entries(identifier: &str, entries: Value) -> Result<Vec<Sample>, String> {
    let entries = match entries {
        Value::Array(entries) => entries,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(format!(
                "samples for {} should be a list, got {}",
                identifier,
                type_name(&other)
            ))
        }
    };
    let samples: Vec<Sample> = entries.iter().filter_map(decode_sample).collect();
    if !entries.is_empty() && samples.is_empty() {
        return Err(format!(
            "none of the {} samples for {} has a recognised shape",
            entries.len(),
            identifier
        ));
    }
    Ok(samples)
}

/// Accepts both sample shapes; anything else is dropped.
pub fn decode_sample(entry: &Value) -> Option<Sample> {
    match entry {
        Value::Object(map) => {
            let timestamp = map.get("timestamp").and_then(decode_timestamp)?;
            let value = map.get("value").cloned().unwrap_or(Value::Null);
            Some(Sample {
                timestamp,
                value: Scalar::from(value),
            })
        }
        Value::Array(pair) if pair.len() >= 2 => {
            let timestamp = decode_timestamp(&pair[0])?;
            Some(Sample {
                timestamp,
                value: Scalar::from(pair[1].clone()),
            })
        }
        _ => None,
    }
}

fn decode_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
