//! Image classification against mocked vision model and bucket endpoints.
//!
//! Run with: cargo test --test classifier_test

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{app_with, get, send, send_raw, test_config};
use weather_station::config::Config;
use weather_station::store;

const BOUNDARY: &str = "wx-test-boundary";
const VISION_PATH: &str = r"/models/gemini-1\.5-flash:generateContent$";

fn upload(field: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: image/jpeg\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/classify")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn vision_reply(text: &str) -> Value {
    json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]})
}

async fn mock_vision(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path_regex(VISION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(vision_reply(text)))
        .mount(server)
        .await;
}

fn config_for(server: &MockServer) -> Config {
    let mut config = test_config();
    config.model_api_base_url = server.uri();
    config.storage_base_url = server.uri();
    config
}

#[tokio::test]
async fn classifies_and_shows_latest_result() {
    let server = MockServer::start().await;
    mock_vision(&server, "Partly cloudy.").await;
    let (app, _) = app_with(config_for(&server)).await;

    let (status, page) = send_raw(&app, get("/classifier")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(page.contains("No image has been classified yet."));

    let (status, body) = send(&app, upload("image", "sky.jpg", b"\xff\xd8\xff\xe0fake-jpeg")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["label"], "partly_cloudy");
    assert_eq!(body["classification"], "partly_cloudy");
    assert_eq!(body["confidence"], Value::Null);
    assert_eq!(body["image_uri"], Value::Null);

    // The image travels inline, base64-encoded
    let requests = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let parts = &sent["contents"][0]["parts"];
    assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
    assert!(parts[1]["inlineData"]["data"].as_str().unwrap().starts_with("/9j/"));

    let (status, page) = send_raw(&app, get("/classifier")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(page.contains("partly cloudy"));
}

#[tokio::test]
async fn unrecognised_output_is_unknown() {
    let server = MockServer::start().await;
    mock_vision(&server, "I see a cat on a fence").await;
    let (app, _) = app_with(config_for(&server)).await;

    let (status, body) = send(&app, upload("image", "cat.jpg", b"not-a-sky")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["label"], "unknown");
}

#[tokio::test]
async fn missing_or_empty_image_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vision_reply("sunny")))
        .expect(0)
        .mount(&server)
        .await;
    let (app, _) = app_with(config_for(&server)).await;

    let (status, body) = send(&app, upload("photo", "sky.jpg", b"bytes")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image provided");

    let (status, body) = send(&app, upload("image", "", b"")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image selected");

    let (status, _) = send(&app, get("/api/classify")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn oversized_image_is_rejected() {
    let server = MockServer::start().await;
    mock_vision(&server, "sunny").await;
    let mut config = config_for(&server);
    config.classifier_max_image_bytes = 16;
    let (app, _) = app_with(config).await;

    let (status, _) = send(&app, upload("image", "big.jpg", &[0u8; 64])).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn publishes_image_and_metadata_to_bucket() {
    let server = MockServer::start().await;
    mock_vision(&server, "raining").await;
    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/wx-bucket/o"))
        .and(query_param("uploadType", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "ok"})))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.bucket_name = Some("wx-bucket".to_string());
    let (app, state) = app_with(config).await;

    let (status, body) = send(&app, upload("image", "sky.jpg", b"jpeg-bytes")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["label"], "raining");
    assert_eq!(body["image_uri"], "gs://wx-bucket/latest_weather_image.jpg");

    let stored = store::classifications::latest(&state.db).await.unwrap().unwrap();
    assert_eq!(stored.image_uri.as_deref(), Some("gs://wx-bucket/latest_weather_image.jpg"));

    let requests = server.received_requests().await.unwrap();
    let metadata = requests
        .iter()
        .find(|r| r.url.query().is_some_and(|q| q.contains("latest_weather_data.json")))
        .unwrap();
    let metadata: Value = serde_json::from_slice(&metadata.body).unwrap();
    assert_eq!(metadata["classification"], "raining");
    assert_eq!(metadata["id"], body["id"]);
}

#[tokio::test]
async fn bucket_failure_is_a_bad_gateway_but_keeps_the_result() {
    let server = MockServer::start().await;
    mock_vision(&server, "overcast").await;
    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/wx-bucket/o"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.bucket_name = Some("wx-bucket".to_string());
    let (app, state) = app_with(config).await;

    let (status, _) = send(&app, upload("image", "sky.jpg", b"jpeg-bytes")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let stored = store::classifications::latest(&state.db).await.unwrap().unwrap();
    assert_eq!(stored.label, "overcast");
    assert_eq!(stored.image_uri, None);
}

#[tokio::test]
async fn metadata_failure_keeps_the_result_without_uri() {
    let server = MockServer::start().await;
    mock_vision(&server, "foggy").await;
    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/wx-bucket/o"))
        .and(query_param("name", "latest_weather_data.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/wx-bucket/o"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "ok"})))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.bucket_name = Some("wx-bucket".to_string());
    let (app, state) = app_with(config).await;

    let (status, _) = send(&app, upload("image", "sky.jpg", b"jpeg-bytes")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let stored = store::classifications::latest(&state.db).await.unwrap().unwrap();
    assert_eq!(stored.label, "foggy");
    assert_eq!(stored.image_uri, None);
}
