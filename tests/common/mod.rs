//! Shared setup for integration tests: an in-memory store with migrations
//! applied and the real router on top.

#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use serde_json::Value;
use tower::ServiceExt;

use weather_station::common::AppState;
use weather_station::config::Config;
use weather_station::routes;

pub async fn test_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
}

pub fn test_config() -> Config {
    Config::for_database("sqlite::memory:")
}

pub async fn app_with(config: Config) -> (Router, AppState) {
    let state = AppState::new(test_db().await, config).unwrap();
    (routes::build_router(state.clone()), state)
}

pub async fn app() -> (Router, AppState) {
    app_with(test_config()).await
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn json(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn send_raw(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send_raw(app, request).await;
    let value = serde_json::from_str(&body).unwrap_or(Value::String(body));
    (status, value)
}
