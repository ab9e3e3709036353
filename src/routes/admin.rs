use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::killswitch::{self, Service, ServiceStatus};
use crate::routes::extract::ApiJson;
use crate::store;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetServiceRequest {
    pub enabled: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BudgetAlertResponse {
    /// `disabled`, `within_budget` or `ignored`
    pub action: &'static str,
    pub services: Vec<Service>,
}

/// Current state of every guarded service
#[utoipa::path(
    get,
    path = "/api/admin/services",
    responses(
        (status = 200, description = "Service states", body = Vec<ServiceStatus>),
    ),
    tag = "admin"
)]
pub async fn list_services(State(state): State<AppState>) -> AppResult<Json<Vec<ServiceStatus>>> {
    let mut statuses = Vec::new();
    for service in Service::guarded() {
        statuses.push(killswitch::status(&state, service).await?);
    }
    Ok(Json(statuses))
}

/// Enable or disable one service
#[utoipa::path(
    put,
    path = "/api/admin/services/{service}",
    params(
        ("service" = String, Path, description = "Service name, e.g. chat"),
    ),
    request_body = SetServiceRequest,
    responses(
        (status = 200, description = "Updated state", body = ServiceStatus),
        (status = 404, description = "Unknown or unguarded service"),
    ),
    tag = "admin"
)]
pub async fn set_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
    ApiJson(request): ApiJson<SetServiceRequest>,
) -> AppResult<Json<ServiceStatus>> {
    let service = Service::parse(&service)
        .filter(|s| s.is_guarded())
        .ok_or_else(|| AppError::NotFound(format!("Unknown service '{service}'")))?;

    store::flags::set(&state.db, &[service], request.enabled, request.reason).await?;
    tracing::warn!(service = %service, enabled = request.enabled, "Service flag changed");

    Ok(Json(killswitch::status(&state, service).await?))
}

/// Budget notification endpoint
///
/// Accepts a push envelope or a bare budget alert. When cost has reached the
/// budget, every guarded service is disabled.
#[utoipa::path(
    post,
    path = "/api/admin/budget-alert",
    request_body = Object,
    responses(
        (status = 200, description = "Alert handled", body = BudgetAlertResponse),
        (status = 400, description = "Undecodable alert"),
    ),
    tag = "admin"
)]
pub async fn budget_alert(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Value>,
) -> AppResult<Json<BudgetAlertResponse>> {
    let Some(alert) = killswitch::parse_budget_alert(&body)? else {
        tracing::info!("Budget message without data ignored");
        return Ok(Json(BudgetAlertResponse {
            action: "ignored",
            services: Vec::new(),
        }));
    };

    if !alert.is_exceeded() {
        tracing::info!(
            cost = alert.cost_amount,
            budget = alert.budget_amount,
            "Budget alert within budget"
        );
        return Ok(Json(BudgetAlertResponse {
            action: "within_budget",
            services: Vec::new(),
        }));
    }

    let services: Vec<Service> = Service::guarded().collect();
    let reason = format!(
        "budget exceeded: {} of {}{}",
        alert.cost_amount,
        alert.budget_amount,
        alert
            .currency_code
            .as_deref()
            .map(|c| format!(" {c}"))
            .unwrap_or_default()
    );
    store::flags::set(&state.db, &services, false, Some(reason)).await?;

    tracing::error!(
        cost = alert.cost_amount,
        budget = alert.budget_amount,
        budget_name = ?alert.budget_display_name,
        "Budget exceeded, all services disabled"
    );

    Ok(Json(BudgetAlertResponse {
        action: "disabled",
        services,
    }))
}
