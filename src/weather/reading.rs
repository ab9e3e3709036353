//! Validation and normalisation of device payloads.
//!
//! The station firmware posts a flat JSON object. Field names have changed
//! over the firmware's life, so a few aliases are accepted, and numeric
//! fields may arrive as strings.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};
use crate::weather::fields::Field;

const DEVICE_KEYS: [&str; 2] = ["device_id", "device"];
const TIMESTAMP_KEYS: [&str; 2] = ["timestamp", "ts"];
const TEMPERATURE_KEYS: [&str; 2] = ["temperature", "temp_c"];

const MAX_DEVICE_ID_LEN: usize = 64;

/// A validated reading, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: Option<f64>,
    pub rain: Option<f64>,
    pub rain_rate: Option<f64>,
    pub luminance: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
}

impl NewReading {
    /// Validate a raw JSON payload.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` when the body is not an object, a
    /// required field is missing, or a value is malformed or implausible.
    pub fn from_payload(payload: &Value, default_device_id: &str) -> AppResult<Self> {
        let Some(obj) = payload.as_object().filter(|o| !o.is_empty()) else {
            return Err(AppError::Validation("No data provided".to_string()));
        };

        let mut missing = Vec::new();
        if lookup(obj, &TIMESTAMP_KEYS).is_none() {
            missing.push("timestamp");
        }
        if lookup(obj, &TEMPERATURE_KEYS).is_none() {
            missing.push("temperature");
        }
        if lookup(obj, &["humidity"]).is_none() {
            missing.push("humidity");
        }
        if !missing.is_empty() {
            return Err(AppError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let device_id = match lookup(obj, &DEVICE_KEYS) {
            Some(value) => parse_device_id(value)?,
            None => default_device_id.to_string(),
        };

        let timestamp = lookup(obj, &TIMESTAMP_KEYS)
            .map(parse_timestamp)
            .transpose()?
            .ok_or_else(|| AppError::Validation("Timestamp is required".to_string()))?;

        let required = |field: Field, keys: &[&str]| -> AppResult<f64> {
            optional_number(obj, field, keys)?
                .ok_or_else(|| AppError::Validation(format!("Missing required fields: {}", field.name())))
        };

        Ok(Self {
            device_id,
            timestamp,
            temperature: required(Field::Temperature, &TEMPERATURE_KEYS)?,
            humidity: required(Field::Humidity, &["humidity"])?,
            pressure: optional_number(obj, Field::Pressure, &["pressure"])?,
            rain: optional_number(obj, Field::Rain, &["rain"])?,
            rain_rate: optional_number(obj, Field::RainRate, &["rain_rate"])?,
            luminance: optional_number(obj, Field::Luminance, &["luminance"])?,
            wind_speed: optional_number(obj, Field::WindSpeed, &["wind_speed"])?,
            wind_direction: optional_number(obj, Field::WindDirection, &["wind_direction"])?,
        })
    }
}

/// First non-null value under any of `keys`.
fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn parse_device_id(value: &Value) -> AppResult<String> {
    let id = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(AppError::Validation(format!(
                "Field device_id must be a string. Received: {other}"
            )));
        }
    };

    let valid = !id.is_empty()
        && id.len() <= MAX_DEVICE_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(AppError::Validation(format!(
            "Field device_id must be 1-{MAX_DEVICE_ID_LEN} characters of [A-Za-z0-9_.-]. Received: {id}"
        )));
    }
    Ok(id)
}

fn optional_number(
    obj: &Map<String, Value>,
    field: Field,
    keys: &[&str],
) -> AppResult<Option<f64>> {
    let Some(raw) = lookup(obj, keys) else {
        return Ok(None);
    };

    let value = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
    .ok_or_else(|| {
        AppError::Validation(format!(
            "Field {} must be a number. Received: {raw}",
            field.name()
        ))
    })?;

    let (min, max) = field.plausible_range();
    if !(min..=max).contains(&value) {
        return Err(AppError::Validation(format!(
            "Field {} is out of range: {value} (expected {min} to {max})",
            field.name()
        )));
    }
    Ok(Some(value))
}

/// Parse a device timestamp: epoch seconds or an RFC 3339 string.
///
/// Sub-second precision is dropped; readings are keyed to the second.
///
/// # Errors
///
/// Returns `AppError::Validation` for any other shape.
pub fn parse_timestamp(value: &Value) -> AppResult<DateTime<Utc>> {
    let invalid = || AppError::Validation(format!("Invalid timestamp format: {value}"));

    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        Value::String(s) => parse_instant(s),
        _ => None,
    }
    .ok_or_else(invalid)?;

    Utc.timestamp_opt(parsed.timestamp(), 0)
        .single()
        .ok_or_else(invalid)
}

/// Parse an instant given as epoch seconds, RFC 3339, or RFC 3339 without seconds
/// (`2025-01-01T00:00Z`).
#[must_use]
pub fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<i64>() {
        return Utc.timestamp_opt(secs, 0).single();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = text.strip_suffix('Z').or_else(|| text.strip_suffix('z'))?;
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Document id shown to clients: device plus the local wall-clock time.
#[must_use]
pub fn document_id(device_id: &str, timestamp: DateTime<Utc>, tz: Tz) -> String {
    format!(
        "{device_id}/reading_{}",
        timestamp.with_timezone(&tz).format("%Y-%m-%dT%H-%M-%S")
    )
}
