//! Coercion of untyped rows into [`SignalRecord`]s.
//!
//! Rows without a usable latitude/longitude pair are dropped rather than
//! reported. Every other field falls back to a concrete default so nothing
//! downstream has to deal with nulls.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::models::{RawRow, SignalRecord, UNKNOWN};

const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

// Postgres text output, e.g. `2024-05-01 10:15:00.123+00`.
const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%#z",
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M:%S%#z",
];

/// Normalize a batch of rows, keeping the input order of the survivors.
pub fn normalize(rows: &[RawRow]) -> Vec<SignalRecord> {
    rows.iter().filter_map(normalize_row).collect()
}

pub fn normalize_row(row: &RawRow) -> Option<SignalRecord> {
    let latitude = row.get("latitude").and_then(coerce_f64)?;
    let longitude = row.get("longitude").and_then(coerce_f64)?;

    Some(SignalRecord {
        id: row.get("id").and_then(coerce_i64),
        device_id: text_or_unknown(row.get("device_id")),
        device_name: text_or_unknown(row.get("device_name")),
        latitude,
        longitude,
        altitude: row.get("altitude").and_then(coerce_f64).unwrap_or(0.0),
        speed: row.get("speed").and_then(coerce_f64).unwrap_or(0.0),
        battery: row.get("battery").and_then(coerce_i64).unwrap_or(0),
        signal: row.get("signal").and_then(coerce_i64).unwrap_or(0),
        sim_operator: text_or_unknown(row.get("sim_operator")),
        network_type: text_or_unknown(row.get("network_type")),
        timestamp: row.get("timestamp").and_then(passthrough_text),
    })
}

/// Finite floats from JSON numbers or numeric text.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;

    parsed.is_finite().then_some(parsed)
}

/// Integers from JSON numbers or text; fractional values truncate toward zero.
pub fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(truncate)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(truncate))
        }
        _ => None,
    }
}

fn truncate(value: f64) -> Option<i64> {
    if value.is_finite() && value.abs() < i64::MAX as f64 {
        Some(value.trunc() as i64)
    } else {
        None
    }
}

fn text_or_unknown(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) if !text.is_empty() => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        // A boolean is a present value either way; only absence maps to Unknown.
        Some(Value::Bool(flag)) => flag.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

fn passthrough_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Parse the timestamp formats seen in the store and in CSV exports.
///
/// Offsetless values are read as UTC. Bare integers are epoch seconds, or
/// epoch milliseconds once they are too large to be a plausible second count.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(value, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|midnight| midnight.and_utc());
    }

    if let Ok(epoch) = value.parse::<i64>() {
        return if epoch.abs() >= 100_000_000_000 {
            DateTime::from_timestamp_millis(epoch)
        } else {
            DateTime::from_timestamp(epoch, 0)
        };
    }

    None
}
