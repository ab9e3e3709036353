use axum::{Json, body::Bytes, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::store;
use crate::weather::{NewReading, reading::document_id};

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    pub status: &'static str,
    /// `{device_id}/reading_{local time}`
    pub document_id: String,
    pub device_id: String,
    pub timestamp_utc: DateTime<Utc>,
    /// Station-local ISO time
    pub timestamp_local: String,
    /// A reading with the same device and timestamp was replaced.
    pub overwritten: bool,
}

/// Store one reading from a station device
#[utoipa::path(
    post,
    path = "/api/readings",
    request_body(content = Object, description = "Device payload: timestamp/ts, temperature/temp_c, humidity required"),
    responses(
        (status = 200, description = "Reading stored", body = IngestResponse),
        (status = 400, description = "Missing, malformed or implausible fields"),
        (status = 409, description = "Older than the device's latest reading"),
        (status = 503, description = "Ingestion disabled"),
    ),
    tag = "ingest"
)]
pub async fn ingest_reading(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<IngestResponse>> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid JSON payload: {e}")))?;
    let reading = NewReading::from_payload(&payload, &state.config.default_device_id)?;

    let outcome = store::readings::upsert(&state.db, reading).await?;
    state.dashboard_cache.invalidate();

    let tz = state.config.local_timezone;
    let stored = outcome.reading;
    let document_id = document_id(&stored.device_id, stored.timestamp, tz);

    tracing::info!(
        %document_id,
        device_id = %stored.device_id,
        overwritten = outcome.overwritten,
        "Reading stored"
    );

    Ok(Json(IngestResponse {
        status: "success",
        document_id,
        timestamp_local: stored.timestamp.with_timezone(&tz).to_rfc3339(),
        timestamp_utc: stored.timestamp,
        device_id: stored.device_id,
        overwritten: outcome.overwritten,
    }))
}
