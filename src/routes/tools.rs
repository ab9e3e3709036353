use axum::{Json, extract::State};
use chrono::Utc;
use serde_json::Value;

use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::query::{self, ToolCall};
use crate::routes::extract::ApiJson;

/// Describe the `queryWeather` tool
#[utoipa::path(
    get,
    path = "/api/tools/query-weather",
    responses(
        (status = 200, description = "Tool name, version and argument schema", body = Object),
    ),
    tag = "tools"
)]
pub async fn describe_tool() -> Json<Value> {
    Json(query::describe())
}

/// Run the `queryWeather` tool
#[utoipa::path(
    post,
    path = "/api/tools/query-weather",
    request_body = ToolCall,
    responses(
        (status = 200, description = "Raw records or aggregates with `_metadata`", body = Object),
        (status = 400, description = "Unknown tool, range or field"),
        (status = 503, description = "Tool service disabled"),
    ),
    tag = "tools"
)]
pub async fn call_tool(
    State(state): State<AppState>,
    ApiJson(call): ApiJson<ToolCall>,
) -> AppResult<Json<Value>> {
    if call.name != query::TOOL_NAME {
        return Err(AppError::BadRequest(format!("Unknown tool: {}", call.name)));
    }

    let result = query::query_weather(
        &state.db,
        &call.arguments,
        Utc::now(),
        state.config.local_timezone,
        None,
    )
    .await?;
    Ok(Json(result))
}
