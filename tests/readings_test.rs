//! Ingestion and retrieval through the HTTP surface.
//!
//! Run with: cargo test --test readings_test

mod common;

use axum::http::{StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{app, get, json as json_request, send};

async fn ingest(app: &axum::Router, body: Value) -> (StatusCode, Value) {
    send(app, json_request("POST", "/api/readings", &body)).await
}

async fn all_readings(app: &axum::Router) -> Vec<Value> {
    let (status, body) = send(app, get("/api/readings?range=all")).await;
    assert_eq!(status, StatusCode::OK);
    body.as_array().cloned().unwrap()
}

#[tokio::test]
async fn stored_reading_is_retrievable_by_range() {
    let (app, _) = app().await;

    let (status, body) = ingest(
        &app,
        json!({"device": "enviro-1", "ts": 1000, "temp_c": 21.5, "humidity": 55}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["device_id"], "enviro-1");
    assert_eq!(body["timestamp_utc"], "1970-01-01T00:16:40Z");
    assert_eq!(body["overwritten"], false);
    assert!(body["document_id"].as_str().unwrap().starts_with("enviro-1/reading_1970-01-01T"));

    let (status, body) = send(&app, get("/api/readings?start=999&end=1001")).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["device_id"], "enviro-1");
    assert_eq!(rows[0]["temperature"], 21.5);
    assert_eq!(rows[0]["humidity"], 55.0);
    assert_eq!(rows[0]["pressure"], Value::Null);
}

#[tokio::test]
async fn invalid_payloads_persist_nothing() {
    let (app, _) = app().await;

    let (status, body) = ingest(&app, json!({"temp_c": 21.5})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields: timestamp, humidity");

    let (status, _) = ingest(&app, json!({"ts": 1000, "temperature": 20, "humidity": 150})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ingest(&app, json!({"ts": 1000, "temperature": "warm", "humidity": 50})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        axum::http::Request::builder()
            .method("POST")
            .uri("/api/readings")
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    assert!(all_readings(&app).await.is_empty());
}

#[tokio::test]
async fn same_key_overwrites_instead_of_duplicating() {
    let (app, _) = app().await;

    ingest(&app, json!({"device": "pico-2", "ts": 1000, "temperature": 18.0, "humidity": 60})).await;
    let (status, body) = ingest(
        &app,
        json!({"device": "pico-2", "ts": 1000, "temperature": 19.0, "humidity": 61}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overwritten"], true);

    let rows = all_readings(&app).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["temperature"], 19.0);
}

#[tokio::test]
async fn older_reading_is_rejected() {
    let (app, _) = app().await;

    ingest(&app, json!({"device": "pico-2", "ts": 2000, "temperature": 18.0, "humidity": 60})).await;
    let (status, body) = ingest(
        &app,
        json!({"device": "pico-2", "ts": 1500, "temperature": 18.5, "humidity": 60}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    // Other devices keep their own ordering
    let (status, _) = ingest(
        &app,
        json!({"device": "pico-3", "ts": 1500, "temperature": 18.5, "humidity": 60}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all_readings(&app).await.len(), 2);
}

#[tokio::test]
async fn empty_selection_returns_latest_and_empty_range_returns_nothing() {
    let (app, _) = app().await;

    let (status, body) = send(&app, get("/api/readings")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    ingest(&app, json!({"ts": 1000, "temperature": 10.0, "humidity": 50})).await;
    ingest(&app, json!({"ts": 2000, "temperature": 12.0, "humidity": 50})).await;

    let (_, body) = send(&app, get("/api/readings")).await;
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["temperature"], 12.0);
    assert_eq!(rows[0]["device_id"], "pico-1");

    let (status, body) = send(&app, get("/api/readings?start=5000&end=6000")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (_, body) = send(&app, get("/api/readings?range=first")).await;
    assert_eq!(body[0]["temperature"], 10.0);
}

#[tokio::test]
async fn invalid_ranges_are_bad_requests() {
    let (app, _) = app().await;

    for uri in [
        "/api/readings?range=tomorrow",
        "/api/readings?range=month=13",
        "/api/readings?start=2000&end=1000",
        "/api/readings?format=xml",
    ] {
        let (status, body) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["error"].is_string(), "{uri}");
    }
}

#[tokio::test]
async fn query_body_needs_both_bounds() {
    let (app, _) = app().await;
    ingest(&app, json!({"ts": 1000, "temperature": 10.0, "humidity": 50})).await;

    let (status, body) = send(
        &app,
        json_request("POST", "/api/readings/query", &json!({"start": "999", "end": "1001"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        json_request("POST", "/api/readings/query", &json!({"start": "999"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        json_request("POST", "/api/readings/query", &json!({"range": "all"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn csv_and_ndjson_formats() {
    let (app, _) = app().await;
    ingest(&app, json!({"ts": 1000, "temperature": 10.0, "humidity": 50, "rain": 0.4})).await;
    ingest(&app, json!({"ts": 2000, "temperature": 11.0, "humidity": 51})).await;

    let response = app.clone().oneshot(get("/api/readings?range=all&format=csv")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("device_id,timestamp,"));
    assert!(lines[1].starts_with("pico-1,1970-01-01T00:16:40Z,"));

    let request = axum::http::Request::builder()
        .uri("/api/readings?range=all")
        .header(header::ACCEPT, "application/x-ndjson")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/x-ndjson");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let lines: Vec<Value> = String::from_utf8(body.to_vec())
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["temperature"], 11.0);
}
