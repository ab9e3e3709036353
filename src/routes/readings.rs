use axum::{
    Json,
    body::Body,
    extract::State,
    http::header::{self, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use utoipa::{IntoParams, ToSchema};

use crate::common::AppState;
use crate::entity::readings;
use crate::error::{AppError, AppResult};
use crate::routes::extract::{ApiJson, ApiQuery};
use crate::store;
use crate::weather;

/// Rows per streamed CSV chunk.
const CSV_CHUNK_ROWS: usize = 500;

const CSV_COLUMNS: [&str; 11] = [
    "device_id",
    "timestamp",
    "timestamp_local",
    "temperature",
    "humidity",
    "pressure",
    "rain",
    "rain_rate",
    "luminance",
    "wind_speed",
    "wind_direction",
];

fn default_format() -> String {
    "json".to_string()
}

/// A stored reading as returned to clients, in storage units.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReadingRecord {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub timestamp_local: String,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: Option<f64>,
    pub rain: Option<f64>,
    /// mm/s
    pub rain_rate: Option<f64>,
    pub luminance: Option<f64>,
    /// m/s
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
}

impl ReadingRecord {
    fn new(reading: readings::Model, tz: Tz) -> Self {
        Self {
            timestamp_local: reading.timestamp.with_timezone(&tz).to_rfc3339(),
            device_id: reading.device_id,
            timestamp: reading.timestamp,
            temperature: reading.temperature,
            humidity: reading.humidity,
            pressure: reading.pressure,
            rain: reading.rain,
            rain_rate: reading.rain_rate,
            luminance: reading.luminance,
            wind_speed: reading.wind_speed,
            wind_direction: reading.wind_direction,
        }
    }
}

fn determine_format(query_format: &str, headers: &HeaderMap) -> String {
    // Query parameter takes precedence
    if !query_format.eq_ignore_ascii_case("json") {
        return query_format.to_lowercase();
    }

    if let Some(accept) = headers.get(header::ACCEPT)
        && let Ok(accept_str) = accept.to_str()
    {
        if accept_str.contains("application/x-ndjson") {
            return "ndjson".to_string();
        }
        if accept_str.contains("text/csv") {
            return "csv".to_string();
        }
    }

    "json".to_string()
}

fn csv_chunk(records: &[ReadingRecord], with_header: bool) -> Result<Vec<u8>, std::io::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    if with_header {
        writer.write_record(CSV_COLUMNS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))
}

fn build_csv_response(records: Vec<ReadingRecord>) -> AppResult<Response> {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Vec<u8>, std::io::Error>>(16);

    tokio::spawn(async move {
        if records.is_empty() {
            let _ = tx.send(csv_chunk(&[], true)).await;
            return;
        }
        for (i, chunk) in records.chunks(CSV_CHUNK_ROWS).enumerate() {
            let bytes = csv_chunk(chunk, i == 0);
            let failed = bytes.is_err();
            if tx.send(bytes).await.is_err() || failed {
                break;
            }
        }
    });

    let body = Body::from_stream(ReceiverStream::new(rx));

    Response::builder()
        .header(header::CONTENT_TYPE, HeaderValue::from_static("text/csv"))
        .body(body)
        .map_err(|e| AppError::Internal(e.to_string()))
}

fn build_ndjson_response(records: Vec<ReadingRecord>) -> AppResult<Response> {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<String, std::io::Error>>(100);

    tokio::spawn(async move {
        for record in &records {
            let line = serde_json::to_string(record)
                .map(|json| format!("{json}\n"))
                .map_err(std::io::Error::other);
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let body = Body::from_stream(ReceiverStream::new(rx));

    Response::builder()
        .header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-ndjson"),
        )
        .body(body)
        .map_err(|e| AppError::Internal(e.to_string()))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReadingsQuery {
    /// Start of an inclusive range: epoch seconds, RFC 3339, or a local date.
    pub start: Option<String>,
    /// End of an inclusive range. A date-only end covers that whole day.
    pub end: Option<String>,
    /// Range keyword (`today`, `last7days`, `month=6`, ...). Overrides start/end.
    pub range: Option<String>,
    /// Restrict to one device
    pub device: Option<String>,
    /// Response format: json (default), ndjson, csv
    #[serde(default = "default_format")]
    pub format: String,
}

/// Get readings for a time selection
///
/// With no parameters, returns the most recent reading. Supports JSON, CSV,
/// and NDJSON formats.
#[utoipa::path(
    get,
    path = "/api/readings",
    params(ReadingsQuery),
    responses(
        (status = 200, description = "Readings ordered by timestamp", body = Vec<ReadingRecord>),
        (status = 400, description = "Invalid range or bounds"),
        (status = 503, description = "Retrieval disabled"),
    ),
    tag = "readings"
)]
pub async fn get_readings(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ReadingsQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let format = determine_format(&query.format, &headers);
    if !matches!(format.as_str(), "json" | "csv" | "ndjson") {
        return Err(AppError::BadRequest(format!("Unsupported format: {format}")));
    }

    let tz = state.config.local_timezone;
    let selection = weather::resolve(
        query.range.as_deref(),
        query.start.as_deref(),
        query.end.as_deref(),
        Utc::now(),
        tz,
    )?;

    let rows = store::readings::select(&state.db, selection, query.device.as_deref()).await?;
    tracing::debug!(count = rows.len(), format = %format, "Readings retrieved");
    let records: Vec<ReadingRecord> = rows.into_iter().map(|r| ReadingRecord::new(r, tz)).collect();

    match format.as_str() {
        "csv" => build_csv_response(records),
        "ndjson" => build_ndjson_response(records),
        _ => Ok(Json(records).into_response()),
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReadingsQueryBody {
    pub range: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub device: Option<String>,
}

/// Query readings with a JSON body
///
/// Takes `{range}` or `{start, end}`. An empty body returns the most recent reading.
#[utoipa::path(
    post,
    path = "/api/readings/query",
    request_body = ReadingsQueryBody,
    responses(
        (status = 200, description = "Readings ordered by timestamp", body = Vec<ReadingRecord>),
        (status = 400, description = "Invalid range, or only one bound given"),
        (status = 503, description = "Retrieval disabled"),
    ),
    tag = "readings"
)]
pub async fn query_readings(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ReadingsQueryBody>,
) -> AppResult<Json<Vec<ReadingRecord>>> {
    let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    if !present(&body.range) && present(&body.start) != present(&body.end) {
        return Err(AppError::BadRequest(
            "Both start and end are required when no range is given".to_string(),
        ));
    }

    let tz = state.config.local_timezone;
    let selection = weather::resolve(
        body.range.as_deref(),
        body.start.as_deref(),
        body.end.as_deref(),
        Utc::now(),
        tz,
    )?;

    let rows = store::readings::select(&state.db, selection, body.device.as_deref()).await?;
    Ok(Json(rows.into_iter().map(|r| ReadingRecord::new(r, tz)).collect()))
}
