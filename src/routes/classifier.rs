use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use chrono::Utc;

use crate::classifier::{self, ClassifyResponse};
use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::routes::html_escape;
use crate::store;

const IMAGE_FIELD: &str = "image";

fn multipart_error(e: &MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Image is too large".to_string())
    } else {
        AppError::BadRequest(format!("Invalid multipart body: {}", e.body_text()))
    }
}

/// Classify the sky conditions in an uploaded image
#[utoipa::path(
    post,
    path = "/api/classify",
    request_body(content_type = "multipart/form-data", description = "Form with an `image` file field"),
    responses(
        (status = 200, description = "Classification stored", body = ClassifyResponse),
        (status = 400, description = "No image provided"),
        (status = 413, description = "Image too large"),
        (status = 429, description = "Rate limited"),
        (status = 502, description = "Vision model or bucket upload failure"),
        (status = 503, description = "Classifier disabled"),
    ),
    tag = "classifier"
)]
pub async fn classify(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<ClassifyResponse>> {
    let mut multipart =
        multipart.map_err(|_| AppError::BadRequest("No image provided".to_string()))?;
    let max_bytes = state.config.classifier_max_image_bytes;

    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(&e))? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let content_type = field
            .content_type()
            .filter(|ct| ct.starts_with("image/"))
            .unwrap_or("image/jpeg")
            .to_string();
        let image = field.bytes().await.map_err(|e| multipart_error(&e))?;

        if image.is_empty() {
            return Err(AppError::BadRequest("No image selected".to_string()));
        }
        if image.len() > max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "Image exceeds {max_bytes} bytes"
            )));
        }

        let result = classifier::classify(&state, image.to_vec(), &content_type, Utc::now()).await?;
        return Ok(Json(result));
    }

    Err(AppError::BadRequest("No image provided".to_string()))
}

/// Latest classification with an upload form.
pub async fn classifier_page(State(state): State<AppState>) -> AppResult<Response> {
    let latest = store::classifications::latest(&state.db).await?;
    let tz = state.config.local_timezone;

    let result = match latest {
        Some(c) => {
            let image = c
                .image_uri
                .as_deref()
                .and_then(|uri| uri.strip_prefix("gs://"))
                .map(|path| {
                    format!(
                        r#"<img src="https://storage.googleapis.com/{}" alt="Latest weather image">"#,
                        html_escape(path)
                    )
                })
                .unwrap_or_default();
            format!(
                r#"{image}
        <p class="label">{}</p>
        <p class="muted">Classified {}</p>"#,
                html_escape(&c.label.replace('_', " ")),
                c.created_at.with_timezone(&tz).format("%A %d %B %Y at %H:%M"),
            )
        }
        None => r#"<p class="muted">No image has been classified yet.</p>"#.to_string(),
    };

    let page = CLASSIFIER_HTML.replace("{{result}}", &result);
    Ok(([(header::CACHE_CONTROL, "no-cache")], Html(page)).into_response())
}

const CLASSIFIER_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Sky Conditions</title>
    <style>
        body { font-family: system-ui, -apple-system, sans-serif; background: #f8fafc; color: #1e293b; }
        .container { max-width: 640px; margin: 0 auto; padding: 1.5rem; }
        img { max-width: 100%; border-radius: 0.5rem; }
        .label { font-size: 1.5rem; font-weight: 600; text-transform: capitalize; }
        .muted { color: #64748b; }
        form { margin-top: 1.5rem; display: flex; gap: 0.5rem; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Sky Conditions</h1>
        {{result}}
        <form id="upload">
            <input type="file" name="image" accept="image/*" required>
            <button type="submit">Classify</button>
        </form>
        <p id="status" class="muted"></p>
    </div>
    <script>
        document.getElementById('upload').addEventListener('submit', async (e) => {
            e.preventDefault();
            const status = document.getElementById('status');
            status.textContent = 'Classifying...';
            const res = await fetch('/api/classify', { method: 'POST', body: new FormData(e.target) });
            const body = await res.json();
            if (res.ok) {
                window.location.reload();
            } else {
                status.textContent = body.error || 'Classification failed';
            }
        });
    </script>
</body>
</html>
"##;
