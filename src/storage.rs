//! Object storage for the classifier's latest image and its metadata.

use reqwest::Client;
use std::time::Duration;

use crate::config::Config;
use crate::error::{AppError, AppResult};

pub const LATEST_IMAGE_OBJECT: &str = "latest_weather_image.jpg";
pub const LATEST_METADATA_OBJECT: &str = "latest_weather_data.json";

pub struct StorageClient {
    http_client: Client,
    base_url: String,
    bucket: Option<String>,
    token: Option<String>,
}

impl StorageClient {
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
            base_url: config.storage_base_url.trim_end_matches('/').to_string(),
            bucket: config.bucket_name.clone(),
            token: config.model_api_token.clone(),
        })
    }

    /// Upload `bytes` as object `name`, replacing any existing object.
    /// Returns the `gs://` URI, or `None` when no bucket is configured.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Upstream` if the upload fails.
    pub async fn put_object(
        &self,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> AppResult<Option<String>> {
        let Some(bucket) = &self.bucket else {
            return Ok(None);
        };

        let url = format!("{}/upload/storage/v1/b/{bucket}/o", self.base_url);
        let mut builder = self
            .http_client
            .post(&url)
            .query(&[("uploadType", "media"), ("name", name)])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Storage upload failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Storage HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        Ok(Some(format!("gs://{bucket}/{name}")))
    }
}
