//! Kill switch, admin surface and budget alerts.
//!
//! Run with: cargo test --test killswitch_test

mod common;

use axum::http::StatusCode;
use base64::{Engine, engine::general_purpose};
use serde_json::json;

use common::{app, app_with, get, json as json_request, send, test_config};
use weather_station::killswitch::Service;

#[tokio::test]
async fn runtime_flag_disables_one_service() {
    let (app, _) = app().await;

    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            "/api/admin/services/tools",
            &json!({"enabled": false, "reason": "maintenance"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "tools");
    assert_eq!(body["enabled"], false);
    assert_eq!(body["source"], "store");

    let (status, body) = send(&app, get("/api/tools/query-weather")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "tools service is disabled");

    // Other services are unaffected
    let (status, _) = send(&app, get("/api/readings")).await;
    assert_eq!(status, StatusCode::OK);

    send(
        &app,
        json_request("PUT", "/api/admin/services/tools", &json!({"enabled": true})),
    )
    .await;
    let (status, _) = send(&app, get("/api/tools/query-weather")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn disabled_ingest_writes_nothing() {
    let mut config = test_config();
    config.disabled_services = vec![Service::Ingest];
    let (app, _) = app_with(config).await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/readings",
            &json!({"ts": 1000, "temperature": 10.0, "humidity": 50}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "ingest service is disabled");

    let (_, body) = send(&app, get("/api/readings?range=all")).await;
    assert_eq!(body, json!([]));

    let (_, body) = send(&app, get("/api/admin/services")).await;
    let ingest = body
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["service"] == "ingest")
        .unwrap();
    assert_eq!(ingest["enabled"], false);
    assert_eq!(ingest["source"], "environment");
}

#[tokio::test]
async fn unknown_or_unguarded_service_is_not_found() {
    let (app, _) = app().await;

    for service in ["billing", "admin"] {
        let (status, _) = send(
            &app,
            json_request(
                "PUT",
                &format!("/api/admin/services/{service}"),
                &json!({"enabled": false}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{service}");
    }
}

#[tokio::test]
async fn budget_alert_over_budget_disables_everything() {
    let (app, _) = app().await;

    let alert = json!({"costAmount": 12.5, "budgetAmount": 10.0, "currencyCode": "GBP"});
    let envelope = json!({
        "message": {"data": general_purpose::STANDARD.encode(alert.to_string())}
    });

    let (status, body) = send(&app, json_request("POST", "/api/admin/budget-alert", &envelope)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "disabled");

    // Repeating the alert is harmless
    let (status, _) = send(&app, json_request("POST", "/api/admin/budget-alert", &envelope)).await;
    assert_eq!(status, StatusCode::OK);

    for uri in ["/api/readings", "/api/tools/query-weather", "/", "/analytics"] {
        let (status, _) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
    }

    let (_, body) = send(&app, get("/api/admin/services")).await;
    assert!(body.as_array().unwrap().iter().all(|s| s["enabled"] == false));

    // Health is never guarded
    let (status, _) = send(&app, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn budget_alert_within_budget_or_without_data_is_a_no_op() {
    let (app, _) = app().await;

    let (_, body) = send(
        &app,
        json_request(
            "POST",
            "/api/admin/budget-alert",
            &json!({"costAmount": 4.0, "budgetAmount": 10.0}),
        ),
    )
    .await;
    assert_eq!(body["action"], "within_budget");

    let (_, body) = send(
        &app,
        json_request("POST", "/api/admin/budget-alert", &json!({"message": {}})),
    )
    .await;
    assert_eq!(body["action"], "ignored");

    let no_amounts = general_purpose::STANDARD.encode(r#"{"budgetDisplayName": "weather"}"#);
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/admin/budget-alert",
            &json!({"message": {"data": no_amounts}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "ignored");

    let (status, _) = send(&app, get("/api/readings")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn only_configured_services_are_mounted() {
    let mut config = test_config();
    config.services = vec![Service::Readings];
    let (app, _) = app_with(config).await;

    let (status, _) = send(&app, get("/api/readings")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, get("/api/tools/query-weather")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, json_request("POST", "/api/chat", &json!({"message": "hi"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
}
