use reqwest::Client;
use std::time::Duration;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::genai::models::{GenerateContentRequest, GenerateContentResponse};

pub struct GenAiClient {
    http_client: Client,
    base_url: String,
    project_id: String,
    location: String,
    token: Option<String>,
}

impl GenAiClient {
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
            base_url: config.model_api_base_url.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            location: config.location.clone(),
            token: config.model_api_token.clone(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            self.base_url, self.project_id, self.location, model
        )
    }

    /// Call `generateContent` on `model`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Upstream` if the request fails, returns an error
    /// status, or the body cannot be parsed.
    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> AppResult<GenerateContentResponse> {
        let mut builder = self.http_client.post(self.endpoint(model)).json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Model request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Model API HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse model response: {e}")))
    }
}
