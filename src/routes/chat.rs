use axum::{Json, extract::State};
use chrono::Utc;

use crate::chat::{self, ChatRequest, ChatResponse};
use crate::common::AppState;
use crate::error::AppResult;
use crate::routes::extract::ApiJson;

/// Ask a question about the station's data
#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Model answer", body = ChatResponse),
        (status = 400, description = "Empty message"),
        (status = 429, description = "Rate limited"),
        (status = 502, description = "Model API failure"),
        (status = 503, description = "Chat disabled"),
    ),
    tag = "chat"
)]
pub async fn chat(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> AppResult<Json<ChatResponse>> {
    Ok(Json(chat::respond(&state, &request, Utc::now()).await?))
}
