use reqwest::Client;
use std::time::Duration;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metoffice::models::HourlyForecastResponse;

pub struct MetOfficeClient {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl MetOfficeClient {
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the HTTP client cannot be built.
    pub fn new(config: &Config) -> AppResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config.met_office_base_url.trim_end_matches('/').to_string(),
            api_key: config.met_office_api_key.clone(),
            latitude: config.latitude,
            longitude: config.longitude,
        })
    }

    /// Whether an API key and a location are configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.latitude.is_some() && self.longitude.is_some()
    }

    /// Fetch the hourly point forecast for the configured location.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ServiceUnavailable` when the key or location is
    /// missing, and `AppError::Upstream` if the request fails, returns an
    /// error status, or the body cannot be parsed.
    pub async fn hourly_forecast(&self) -> AppResult<HourlyForecastResponse> {
        let (Some(api_key), Some(latitude), Some(longitude)) =
            (&self.api_key, self.latitude, self.longitude)
        else {
            return Err(AppError::ServiceUnavailable(
                "Forecast source is not configured: MET_OFFICE_API_KEY, LATITUDE and LONGITUDE are required"
                    .to_string(),
            ));
        };

        let url = format!(
            "{}/sitespecific/v0/point/hourly?latitude={latitude}&longitude={longitude}",
            self.base_url
        );

        let response = self
            .http_client
            .get(&url)
            .header("apikey", api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Forecast request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::Upstream("Forecast API rate limited (429)".to_string()));
        }

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Forecast API HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse forecast response: {e}")))
    }
}
