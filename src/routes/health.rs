use axum::http::StatusCode;

/// Health check endpoint
///
/// Returns 200 OK if the process is serving. Never guarded by the kill
/// switch or rate limited, so it is safe for liveness probes.
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "health"
)]
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}
