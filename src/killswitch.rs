//! Per-service kill switch.
//!
//! A service is disabled when it is listed in `DISABLED_SERVICES` or when the
//! shared store holds a disabled flag for it. Each guarded request reads the
//! flag exactly once before any handler work happens.

use std::fmt;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::store::flags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Ingest,
    Readings,
    Tools,
    Dashboard,
    Analytics,
    Chat,
    Classifier,
    Forecast,
    Admin,
}

impl Service {
    pub const ALL: [Self; 9] = [
        Self::Ingest,
        Self::Readings,
        Self::Tools,
        Self::Dashboard,
        Self::Analytics,
        Self::Chat,
        Self::Classifier,
        Self::Forecast,
        Self::Admin,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Readings => "readings",
            Self::Tools => "tools",
            Self::Dashboard => "dashboard",
            Self::Analytics => "analytics",
            Self::Chat => "chat",
            Self::Classifier => "classifier",
            Self::Forecast => "forecast",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Admin stays reachable so a tripped switch can be reset.
    #[must_use]
    pub fn is_guarded(self) -> bool {
        self != Self::Admin
    }

    /// Services the kill switch can turn off.
    pub fn guarded() -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().filter(|s| s.is_guarded())
    }

    /// Parse a comma-separated list; `all` expands to every service.
    ///
    /// # Errors
    ///
    /// Returns the first unknown name.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, String> {
        let mut services = Vec::new();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if item.eq_ignore_ascii_case("all") {
                return Ok(Self::ALL.to_vec());
            }
            let service = Self::parse(item).ok_or_else(|| format!("unknown service '{item}'"))?;
            if !services.contains(&service) {
                services.push(service);
            }
        }
        Ok(services)
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a service's current state comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FlagSource {
    /// Deploy-time `DISABLED_SERVICES`.
    Environment,
    /// Runtime flag in the shared store.
    Store,
    /// No flag anywhere.
    Default,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ServiceStatus {
    pub service: Service,
    pub enabled: bool,
    pub reason: Option<String>,
    pub source: FlagSource,
}

/// Resolve whether `service` may do work right now.
///
/// # Errors
///
/// Returns `AppError::Database` if the flag cannot be read.
pub async fn status(state: &AppState, service: Service) -> AppResult<ServiceStatus> {
    if state.config.disabled_services.contains(&service) {
        return Ok(ServiceStatus {
            service,
            enabled: false,
            reason: Some("disabled by DISABLED_SERVICES".to_string()),
            source: FlagSource::Environment,
        });
    }

    Ok(match flags::get(&state.db, service).await? {
        Some(flag) => ServiceStatus {
            service,
            enabled: flag.enabled,
            reason: flag.reason,
            source: FlagSource::Store,
        },
        None => ServiceStatus {
            service,
            enabled: true,
            reason: None,
            source: FlagSource::Default,
        },
    })
}

/// Router state for [`guard`].
#[derive(Clone)]
pub struct Guarded {
    pub state: AppState,
    pub service: Service,
}

/// Middleware answering 503 when the wrapped service is switched off.
pub async fn guard(State(guarded): State<Guarded>, request: Request, next: Next) -> Response {
    let Guarded { state, service } = guarded;
    match status(&state, service).await {
        Ok(s) if s.enabled => next.run(request).await,
        Ok(s) => {
            tracing::info!(service = %service, reason = ?s.reason, "Request refused by kill switch");
            AppError::ServiceUnavailable(format!("{service} service is disabled")).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Budget notification as published by cloud billing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetAlert {
    pub cost_amount: f64,
    pub budget_amount: f64,
    #[serde(default)]
    pub budget_display_name: Option<String>,
    #[serde(default)]
    pub currency_code: Option<String>,
}

impl BudgetAlert {
    #[must_use]
    pub fn is_exceeded(&self) -> bool {
        self.cost_amount >= self.budget_amount
    }
}

/// Extract a budget alert from a push envelope (`{message: {data: base64}}`)
/// or a bare alert body. `Ok(None)` means the message carried no data or no
/// amounts.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for undecodable data or a body of neither shape.
pub fn parse_budget_alert(body: &Value) -> AppResult<Option<BudgetAlert>> {
    if let Some(message) = body.get("message") {
        let Some(data) = message.get("data").and_then(Value::as_str).filter(|d| !d.is_empty()) else {
            return Ok(None);
        };
        let decoded = general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| AppError::BadRequest(format!("Message data is not valid base64: {e}")))?;
        let decoded: Value = serde_json::from_slice(&decoded)
            .map_err(|e| AppError::BadRequest(format!("Message data is not JSON: {e}")))?;
        // Acknowledged, so the push is not redelivered, but never acted on
        if decoded.get("costAmount").is_none() || decoded.get("budgetAmount").is_none() {
            tracing::info!("Budget notification without amounts ignored");
            return Ok(None);
        }
        let alert = serde_json::from_value(decoded)
            .map_err(|e| AppError::BadRequest(format!("Message data is not a budget alert: {e}")))?;
        return Ok(Some(alert));
    }

    serde_json::from_value(body.clone())
        .map(Some)
        .map_err(|e| AppError::BadRequest(format!("Body is not a budget alert: {e}")))
}
