//! Sky-condition classification of station camera images.

use base64::{Engine, engine::general_purpose};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::AppState;
use crate::entity::classifications;
use crate::error::{AppError, AppResult};
use crate::genai::models::{Content, GenerateContentRequest, GenerationConfig, Part};
use crate::storage::{LATEST_IMAGE_OBJECT, LATEST_METADATA_OBJECT};
use crate::store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Sunny,
    PartlyCloudy,
    Overcast,
    Raining,
    Snowing,
    Foggy,
    Night,
    Dawn,
    Dusk,
    Unknown,
}

impl Label {
    /// Labels the model may answer with, in matching priority order.
    pub const KNOWN: [Self; 9] = [
        Self::Sunny,
        Self::PartlyCloudy,
        Self::Overcast,
        Self::Raining,
        Self::Snowing,
        Self::Foggy,
        Self::Night,
        Self::Dawn,
        Self::Dusk,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sunny => "sunny",
            Self::PartlyCloudy => "partly_cloudy",
            Self::Overcast => "overcast",
            Self::Raining => "raining",
            Self::Snowing => "snowing",
            Self::Foggy => "foggy",
            Self::Night => "night",
            Self::Dawn => "dawn",
            Self::Dusk => "dusk",
            Self::Unknown => "unknown",
        }
    }

    /// Map free model output onto the label set.
    ///
    /// An exact match wins; otherwise the first known label contained in the
    /// text; otherwise `Unknown`.
    #[must_use]
    pub fn from_model_output(text: &str) -> Self {
        let normalized: String = text
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        let normalized = normalized.trim_end_matches(|c: char| c.is_ascii_punctuation() && c != '_');

        Self::KNOWN
            .into_iter()
            .find(|l| l.name() == normalized)
            .or_else(|| Self::KNOWN.into_iter().find(|l| normalized.contains(l.name())))
            .unwrap_or(Self::Unknown)
    }
}

/// A score in `0..=1` if the model volunteered one.
fn parse_confidence(text: &str) -> Option<f64> {
    text.split(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | ',' | ':' | '='))
        .filter_map(|token| token.trim_end_matches('%').parse::<f64>().ok().map(|v| (token, v)))
        .map(|(token, v)| if token.ends_with('%') { v / 100.0 } else { v })
        .find(|v| (0.0..=1.0).contains(v))
}

fn prompt() -> String {
    let labels: Vec<String> = Label::KNOWN.iter().map(|l| format!("- {}", l.name())).collect();
    format!(
        "Analyze this outdoor image and classify the weather conditions.\n\
         Look at the sky, lighting, and any visible precipitation or weather phenomena.\n\
         Respond with exactly ONE of these weather labels:\n{}\n\
         Only respond with the single weather label, nothing else.",
        labels.join("\n")
    )
}

/// Upload the image and its metadata to the bucket, if one is configured.
async fn publish(
    state: &AppState,
    id: Uuid,
    label: Label,
    image: Vec<u8>,
    content_type: &str,
    now: DateTime<Utc>,
) -> AppResult<Option<String>> {
    let Some(image_uri) = state
        .storage
        .put_object(LATEST_IMAGE_OBJECT, content_type, image)
        .await?
    else {
        return Ok(None);
    };

    let metadata = json!({
        "id": id,
        "classification": label.name(),
        "timestamp": now.to_rfc3339_opts(SecondsFormat::Secs, true),
    });
    state
        .storage
        .put_object(
            LATEST_METADATA_OBJECT,
            "application/json",
            metadata.to_string().into_bytes(),
        )
        .await?;

    Ok(Some(image_uri))
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClassifyResponse {
    pub id: Uuid,
    /// Same as `label`.
    pub classification: Label,
    pub label: Label,
    pub confidence: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub status: &'static str,
    pub image_uri: Option<String>,
}

/// Classify an uploaded image, store the outcome, and publish it to the bucket.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for an empty image, `AppError::Upstream`
/// when the model or the bucket upload fails, and `AppError::Database` if the
/// result cannot be stored. A failed upload leaves the stored row without an
/// image URI.
pub async fn classify(
    state: &AppState,
    image: Vec<u8>,
    content_type: &str,
    now: DateTime<Utc>,
) -> AppResult<ClassifyResponse> {
    if image.is_empty() {
        return Err(AppError::BadRequest("No image selected".to_string()));
    }

    let request = GenerateContentRequest {
        contents: vec![Content::user(vec![
            Part::text(prompt()),
            Part::inline_data(content_type, general_purpose::STANDARD.encode(&image)),
        ])],
        generation_config: Some(GenerationConfig {
            temperature: Some(0.0),
            max_output_tokens: Some(16),
        }),
        ..GenerateContentRequest::default()
    };
    let response = state
        .genai
        .generate_content(&state.config.vision_model, &request)
        .await?;

    let raw_output = response.text().unwrap_or_default();
    let label = Label::from_model_output(&raw_output);
    let confidence = parse_confidence(&raw_output);
    let id = Uuid::new_v4();
    let image_bytes = i64::try_from(image.len()).unwrap_or(i64::MAX);

    tracing::info!(%id, label = label.name(), raw = %raw_output, "Image classified");

    // Stored before publishing: bucket metadata always names an existing row.
    store::classifications::insert(
        &state.db,
        classifications::Model {
            id,
            label: label.name().to_string(),
            raw_output,
            confidence,
            image_uri: None,
            content_type: Some(content_type.to_string()),
            image_bytes,
            created_at: now,
        },
    )
    .await?;

    let image_uri = publish(state, id, label, image, content_type, now).await?;
    if let Some(uri) = &image_uri {
        store::classifications::set_image_uri(&state.db, id, uri).await?;
    }

    Ok(ClassifyResponse {
        id,
        classification: label,
        label,
        confidence,
        timestamp: now,
        status: "success",
        image_uri,
    })
}
