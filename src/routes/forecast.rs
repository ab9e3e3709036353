use axum::{Json, extract::State};
use chrono::Utc;
use serde_json::Value;

use crate::common::AppState;
use crate::error::AppResult;
use crate::forecast::{self, ForecastQuery, RefreshResponse};
use crate::routes::extract::ApiJson;

/// Fetch and store the hourly forecast
#[utoipa::path(
    post,
    path = "/api/forecast/refresh",
    responses(
        (status = 200, description = "Forecast stored", body = RefreshResponse),
        (status = 502, description = "Forecast API failure or malformed payload"),
        (status = 503, description = "Forecast disabled or not configured"),
    ),
    tag = "forecast"
)]
pub async fn refresh_forecast(State(state): State<AppState>) -> AppResult<Json<RefreshResponse>> {
    Ok(Json(forecast::refresh(&state, Utc::now()).await?))
}

/// Stored forecast hours for a range
#[utoipa::path(
    post,
    path = "/api/forecast/query",
    request_body = ForecastQuery,
    responses(
        (status = 200, description = "Forecast hours ordered by time", body = Vec<Object>),
        (status = 400, description = "Missing or invalid range, or unknown field"),
        (status = 503, description = "Forecast disabled"),
    ),
    tag = "forecast"
)]
pub async fn query_forecast(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ForecastQuery>,
) -> AppResult<Json<Vec<Value>>> {
    Ok(Json(forecast::query(&state, &request, Utc::now()).await?))
}
