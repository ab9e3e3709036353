//! Static dashboard, analytics API and the query tool.
//!
//! Run with: cargo test --test dashboard_test

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;

use common::{app, get, json as json_request, send, send_raw};

#[tokio::test]
async fn dashboard_renders_and_refreshes_after_ingest() {
    let (app, _) = app().await;

    let (status, page) = send_raw(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(page.contains("No readings yet."));
    assert!(page.contains("N/A"));

    let now = Utc::now().timestamp();
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/readings",
            &json!({"device": "enviro-1", "ts": now, "temperature": 17.25, "humidity": 64,
                    "wind_speed": 4.0, "wind_direction": 225}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The cached page is dropped on ingest
    let (status, page) = send_raw(&app, get("/dashboard")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(page.contains("enviro-1"));
    assert!(page.contains("17.3 &deg;C") || page.contains("17.2 &deg;C"));
    assert!(page.contains("(SW)"));
}

#[tokio::test]
async fn analytics_falls_back_to_latest_and_rejects_unknown_fields() {
    let (app, _) = app().await;

    let (status, body) = send(&app, get("/api/analytics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["periods"], json!([]));
    assert_eq!(body["statistics"]["median_temperature"], serde_json::Value::Null);

    // Nothing today, so the default view shows the latest reading
    send(
        &app,
        json_request("POST", "/api/readings", &json!({"ts": 1000, "temperature": 9.0, "humidity": 70})),
    )
    .await;
    let (status, body) = send(&app, get("/api/analytics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["periods"].as_array().unwrap().len(), 1);
    assert_eq!(body["statistics"]["max_temperature"], 9.0);

    let (status, _) = send(&app, get("/api/analytics?field=dew_point")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, page) = send_raw(&app, get("/analytics")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(page.contains("/api/analytics"));
}

#[tokio::test]
async fn analytics_buckets_a_week_by_day() {
    let (app, _) = app().await;
    let now = Utc::now();
    for days in [3, 2, 1] {
        let ts = (now - Duration::days(days)).timestamp();
        send(
            &app,
            json_request(
                "POST",
                "/api/readings",
                &json!({"ts": ts, "temperature": 10.0 + days as f64, "humidity": 60, "rain": 2.0}),
            ),
        )
        .await;
    }

    let (status, body) = send(&app, get("/api/analytics?range=last7days&field=rain")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["granularity"], "day");
    assert_eq!(body["field"], "rain");
    assert_eq!(body["periods"].as_array().unwrap().len(), 3);
    assert_eq!(body["statistics"]["total_rainfall"], 6.0);
    assert_eq!(body["statistics"]["rainy_days"], "3/3");
}

#[tokio::test]
async fn query_tool_describes_and_aggregates() {
    let (app, _) = app().await;

    let (status, body) = send(&app, get("/api/tools/query-weather")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "weatherstation");
    assert!(body["actions"]["queryWeather"].is_object());

    for (ts, temperature) in [(1000, 10.0), (2000, 14.0)] {
        send(
            &app,
            json_request(
                "POST",
                "/api/readings",
                &json!({"ts": ts, "temperature": temperature, "humidity": 50, "wind_speed": 10.0}),
            ),
        )
        .await;
    }

    let call = |arguments| json!({"name": "queryWeather", "arguments": arguments});

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/tools/query-weather",
            &call(json!({"range": "all", "operation": "max", "fields": ["temperature", "wind_speed"]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["temperature"], 14.0);
    assert_eq!(body["wind_speed"], 22.4);
    assert_eq!(body["_metadata"]["record_count"], 2);
    assert_eq!(body["_metadata"]["units"]["wind_speed"], "mph");

    let (_, body) = send(
        &app,
        json_request(
            "POST",
            "/api/tools/query-weather",
            &call(json!({"range": "all", "fields": ["timestamp_UTC", "temperature"]})),
        ),
    )
    .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"][0]["timestamp_UTC"], "1970-01-01T00:16:40Z");

    let (_, body) = send(
        &app,
        json_request(
            "POST",
            "/api/tools/query-weather",
            &call(json!({"range": "year=2020", "operation": "mean", "fields": ["temperature"]})),
        ),
    )
    .await;
    assert_eq!(body["temperature"], serde_json::Value::Null);
    assert_eq!(body["_metadata"]["record_count"], 0);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/tools/query-weather",
            &json!({"name": "dropTables", "arguments": {}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/tools/query-weather",
            &call(json!({"range": "all", "fields": ["dew_point"]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unknown fields: dew_point");
}

#[tokio::test]
async fn malformed_parameters_keep_the_error_envelope() {
    let (app, _) = app().await;

    let (status, body) = send(&app, get("/api/analytics?temp_stat=mean")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/tools/query-weather",
            &json!({"name": "queryWeather", "arguments": {"range": "all", "operation": "median"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(
        &app,
        json_request("PUT", "/api/admin/services/chat", &json!({"reason": "no flag"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}
