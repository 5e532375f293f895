//! Record-level cleaning shared by both pipelines.
//!
//! Every function here is a single pass over the batch; none of them touch I/O.

use crate::core::Record;
use crate::utils::error::SchemaError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::HashMap;

const NORMALIZED_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];

/// Lowercases keys, trims them and turns inner spaces into underscores.
///
/// When two raw keys collapse to the same name the later value wins and the key
/// keeps its first position.
pub fn clean_column_names(records: Vec<Record>) -> Vec<Record> {
    records
        .into_iter()
        .map(|record| {
            let data = record
                .data
                .into_iter()
                .map(|(key, value)| (key.trim().to_lowercase().replace(' ', "_"), value))
                .collect();
            Record { data }
        })
        .collect()
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(obj) => obj.is_empty(),
        _ => false,
    }
}

/// Drops records where every value is null, `""`, `[]` or `{}`.
pub fn drop_empty_rows(records: Vec<Record>) -> Vec<Record> {
    records
        .into_iter()
        .filter(|record| record.data.values().any(|v| !is_blank(v)))
        .collect()
}

fn parse_loose_datetime(raw: &str) -> Option<NaiveDateTime> {
    let candidate = raw.replace('Z', "").replace('/', "-");
    let candidate = candidate.trim();

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(candidate, format) {
            return Some(parsed);
        }
    }
    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(candidate, format) {
            return Some(parsed.naive_local());
        }
    }
    NaiveDate::parse_from_str(candidate, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Rewrites date-like strings as `YYYY-MM-DD HH:MM:SS`.
///
/// Only strings containing `-`, `T` or `/` are considered; anything that does not
/// parse is left as it was.
pub fn normalize_dates(mut records: Vec<Record>) -> Vec<Record> {
    for record in &mut records {
        for value in record.data.values_mut() {
            let parsed = match &*value {
                Value::String(text) if text.contains(['-', 'T', '/']) => parse_loose_datetime(text),
                _ => None,
            };
            if let Some(parsed) = parsed {
                *value = Value::String(parsed.format(NORMALIZED_DATE_FORMAT).to_string());
            }
        }
    }
    records
}

/// Checks that the first record carries every required field.
pub fn validate_schema(records: &[Record], required_fields: &[&str]) -> Result<(), SchemaError> {
    let first = records.first().ok_or(SchemaError::EmptyDataset)?;

    let missing: Vec<String> = required_fields
        .iter()
        .filter(|field| !first.contains_key(field))
        .map(|field| field.to_string())
        .collect();

    if !missing.is_empty() {
        return Err(SchemaError::MissingFields(missing));
    }

    tracing::debug!("✔ Schema validated successfully");
    Ok(())
}

/// Fills null or empty values of the listed columns with per-column defaults.
pub fn null_to_default(mut records: Vec<Record>, defaults: &HashMap<String, Value>) -> Vec<Record> {
    for record in &mut records {
        for (column, default) in defaults {
            if let Some(value) = record.data.get_mut(column) {
                let empty = match value {
                    Value::Null => true,
                    Value::String(s) => s.is_empty(),
                    _ => false,
                };
                if empty {
                    *value = default.clone();
                }
            }
        }
    }
    records
}

pub fn safe_int(value: &Value, default: i64) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(default),
        Value::String(s) => s.trim().parse().unwrap_or(default),
        Value::Bool(b) => i64::from(*b),
        _ => default,
    }
}

pub fn safe_float(value: &Value, default: f64) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(default),
        Value::String(s) => s.trim().parse().unwrap_or(default),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => default,
    }
}
