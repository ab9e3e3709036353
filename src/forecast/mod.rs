//! Hourly point forecast: fetch from the Met Office, store, query back.

pub mod scheduler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use utoipa::ToSchema;

use crate::common::AppState;
use crate::entity::forecast_hours;
use crate::error::{AppError, AppResult};
use crate::metoffice::models::{HourlyForecastResponse, TimeStep};
use crate::store;
use crate::weather::range;
use crate::weather::reading::parse_instant;

/// Fields a forecast query may select. `time` is always returned.
pub const FIELDS: [&str; 7] = [
    "time",
    "temperature",
    "humidity",
    "pressure",
    "rain_total",
    "prob_of_rain",
    "wind_speed",
];

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub status: &'static str,
    pub message: String,
    pub document_id: String,
    pub forecasts_processed: usize,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ForecastQuery {
    pub range: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub fields: Option<Vec<String>>,
}

/// `forecast_YYYY-MM-DD` for the UTC day of a fetch.
#[must_use]
pub fn forecast_id(fetched_at: DateTime<Utc>) -> String {
    format!("forecast_{}", fetched_at.format("%Y-%m-%d"))
}

fn shape_hour(step: &TimeStep, id: &str, fetched_at: DateTime<Utc>) -> AppResult<forecast_hours::Model> {
    let time = parse_instant(&step.time).ok_or_else(|| {
        AppError::Upstream(format!("Unexpected forecast time: {}", step.time))
    })?;
    Ok(forecast_hours::Model {
        time,
        forecast_id: id.to_string(),
        temperature: step.screen_temperature,
        humidity: step.screen_relative_humidity,
        // Pa to hPa
        pressure: step.mslp.map(|pa| pa / 100.0),
        rain_total: step.total_precip_amount,
        prob_of_rain: step.prob_of_precipitation,
        wind_speed: step.wind_speed_10m,
        fetched_at,
    })
}

/// Turn an API response into rows.
///
/// # Errors
///
/// Returns `AppError::Upstream` when the response has no features or an hour
/// carries an unparseable time.
pub fn shape(
    response: &HourlyForecastResponse,
    fetched_at: DateTime<Utc>,
) -> AppResult<Vec<forecast_hours::Model>> {
    let feature = response.features.first().ok_or_else(|| {
        AppError::Upstream("Invalid or unexpected API data structure: no features".to_string())
    })?;
    let id = forecast_id(fetched_at);
    feature
        .properties
        .time_series
        .iter()
        .map(|step| shape_hour(step, &id, fetched_at))
        .collect()
}

/// Fetch the hourly forecast and store every hour it covers.
///
/// # Errors
///
/// Returns `AppError::ServiceUnavailable` when the source is not configured,
/// `AppError::Upstream` on fetch or payload failures, and `AppError::Database`
/// if the hours cannot be stored.
pub async fn refresh(state: &AppState, now: DateTime<Utc>) -> AppResult<RefreshResponse> {
    let response = state.met_office.hourly_forecast().await?;
    let hours = shape(&response, now)?;
    let document_id = forecast_id(now);
    let forecasts_processed = store::forecasts::upsert_hours(&state.db, hours).await?;

    tracing::info!(%document_id, forecasts_processed, "Stored weather forecast");

    Ok(RefreshResponse {
        status: "success",
        message: "Weather forecast stored successfully".to_string(),
        document_id,
        forecasts_processed,
    })
}

fn selected_fields(requested: Option<&[String]>) -> AppResult<Vec<&'static str>> {
    let Some(requested) = requested else {
        return Ok(FIELDS.to_vec());
    };
    let mut fields = vec!["time"];
    for name in requested {
        let field = FIELDS
            .iter()
            .copied()
            .find(|f| f == name)
            .ok_or_else(|| AppError::BadRequest(format!("Invalid field requested: {name}")))?;
        if !fields.contains(&field) {
            fields.push(field);
        }
    }
    Ok(fields)
}

fn record(hour: &forecast_hours::Model, fields: &[&str]) -> Value {
    let mut out = Map::new();
    for &field in fields {
        let value = match field {
            "time" => json!(hour.time.to_rfc3339()),
            "temperature" => json!(hour.temperature),
            "humidity" => json!(hour.humidity),
            "pressure" => json!(hour.pressure),
            "rain_total" => json!(hour.rain_total),
            "prob_of_rain" => json!(hour.prob_of_rain),
            "wind_speed" => json!(hour.wind_speed),
            _ => continue,
        };
        out.insert(field.to_string(), value);
    }
    Value::Object(out)
}

/// Stored forecast hours for a range, earliest first.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for a missing or invalid range or an
/// unknown field, and `AppError::Database` on query failure.
pub async fn query(state: &AppState, request: &ForecastQuery, now: DateTime<Utc>) -> AppResult<Vec<Value>> {
    let fields = selected_fields(request.fields.as_deref())?;

    let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    if !has(&request.range) && !(has(&request.start) && has(&request.end)) {
        return Err(AppError::BadRequest(
            "Invalid request. Expected \"range\" or \"start\"/\"end\" in JSON body.".to_string(),
        ));
    }
    let selection = range::resolve(
        request.range.as_deref(),
        request.start.as_deref(),
        request.end.as_deref(),
        now,
        state.config.local_timezone,
    )?;

    let hours = store::forecasts::select(&state.db, selection).await?;
    tracing::debug!(count = hours.len(), "Forecast hours retrieved");
    Ok(hours.iter().map(|h| record(h, &fields)).collect())
}
