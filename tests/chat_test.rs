//! Chat turns against a mocked model endpoint.
//!
//! Run with: cargo test --test chat_test

mod common;

use axum::http::StatusCode;
use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{app_with, json as json_request, send, test_config};

const MODEL_PATH: &str = r"^/v1/projects/weather-station-local/locations/europe-west2/publishers/google/models/.+:generateContent$";

fn text_reply(text: &str) -> Value {
    json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]})
}

fn tool_call(args: Value) -> Value {
    json!({"candidates": [{"content": {"role": "model", "parts": [
        {"functionCall": {"name": "query_weather", "args": args}}
    ]}}]})
}

async fn chat_app(server: &MockServer) -> axum::Router {
    let mut config = test_config();
    config.model_api_base_url = server.uri();
    app_with(config).await.0
}

#[tokio::test]
async fn tool_call_feeds_readings_back_to_the_model() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path_regex(MODEL_PATH))
        .and(body_string_contains("functionResponse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("It is 21.5 °C right now.")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_call(json!({
            "range_param": "latest",
            "fields": ["timestamp_UTC", "temperature"]
        }))))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let app = chat_app(&server).await;
    send(
        &app,
        json_request(
            "POST",
            "/api/readings",
            &json!({"ts": 1000, "temperature": 21.5, "humidity": 48}),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        json_request("POST", "/api/chat", &json!({"message": "How warm is it?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "It is 21.5 °C right now.");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let first = String::from_utf8_lossy(&requests[0].body);
    assert!(first.contains("functionDeclarations"));
    assert!(first.contains("How warm is it?"));
    let second = String::from_utf8_lossy(&requests[1].body);
    assert!(second.contains("functionResponse"));
    assert!(second.contains("21.5"));
}

#[tokio::test]
async fn plain_answer_needs_one_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("Hello! Ask me about the weather.")))
        .expect(1)
        .mount(&server)
        .await;

    let app = chat_app(&server).await;
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/chat",
            &json!({
                "message": "hi",
                "history": [{"role": "user", "content": "hello"}, {"role": "assistant", "content": "hey"}]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "Hello! Ask me about the weather.");
}

#[tokio::test]
async fn empty_candidates_fall_back_to_apology() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let app = chat_app(&server).await;
    let (status, body) = send(
        &app,
        json_request("POST", "/api/chat", &json!({"message": "Will it rain?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["answer"],
        "I couldn't generate a proper response. Please try asking about the weather again."
    );
}

#[tokio::test]
async fn model_failure_is_a_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(MODEL_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("quota"))
        .mount(&server)
        .await;

    let app = chat_app(&server).await;
    let (status, body) = send(
        &app,
        json_request("POST", "/api/chat", &json!({"message": "Will it rain?"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn empty_message_is_rejected_without_calling_the_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let app = chat_app(&server).await;
    let (status, _) = send(&app, json_request("POST", "/api/chat", &json!({"message": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_body_is_a_json_bad_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let app = chat_app(&server).await;
    let (status, body) = send(&app, json_request("POST", "/api/chat", &json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("message"));

    let (status, body) = send(
        &app,
        json_request("POST", "/api/chat", &json!({"message": "hi", "history": [{"role": "system", "content": "x"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}
