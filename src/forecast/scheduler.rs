use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::interval;

use crate::common::AppState;
use crate::error::AppResult;
use crate::forecast::{self, RefreshResponse};
use crate::killswitch::{self, Service};

/// One scheduled refresh. Returns `Ok(None)` without touching the forecast
/// source or the store when the kill switch has the forecast service off.
///
/// # Errors
///
/// Returns the flag lookup or refresh error.
pub async fn scheduled_refresh(
    state: &AppState,
    now: DateTime<Utc>,
) -> AppResult<Option<RefreshResponse>> {
    let status = killswitch::status(state, Service::Forecast).await?;
    if !status.enabled {
        tracing::info!(reason = ?status.reason, "Forecast service disabled, skipping refresh");
        return Ok(None);
    }
    forecast::refresh(state, now).await.map(Some)
}

/// Refresh the stored forecast on a schedule.
///
/// Runs once immediately, then every `FORECAST_REFRESH_INTERVAL_SECONDS`.
/// Failures are logged and the next tick tries again.
pub async fn run_forecast_refresh(state: AppState) {
    let interval_secs = state.config.forecast_refresh_interval_seconds;
    if interval_secs == 0 {
        tracing::info!("Forecast refresh scheduler disabled");
        return;
    }
    if !state.met_office.is_configured() {
        tracing::warn!("Forecast source not configured, scheduler not started");
        return;
    }

    tracing::info!(interval_secs, "Starting forecast refresh scheduler");

    let mut ticker = interval(Duration::from_secs(interval_secs));

    loop {
        ticker.tick().await;
        tracing::debug!("Running forecast refresh...");

        match scheduled_refresh(&state, Utc::now()).await {
            Ok(Some(result)) => tracing::debug!(
                document_id = %result.document_id,
                forecasts_processed = result.forecasts_processed,
                "Forecast refresh completed successfully"
            ),
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "Forecast refresh failed"),
        }
    }
}
