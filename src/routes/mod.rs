pub mod admin;
pub mod analytics;
pub mod chat;
pub mod classifier;
pub mod dashboard;
mod extract;
pub mod forecast;
pub mod health;
pub mod ingest;
mod rate_limit;
pub mod readings;
pub mod tools;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};

use rate_limit::FallbackIpKeyExtractor;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::common::AppState;
use crate::config::Config;
use crate::killswitch::{self, Guarded, Service};

/// Body limit for JSON endpoints.
const JSON_BODY_LIMIT: usize = 1024 * 1024;

/// Room for multipart boundaries and headers around an image.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Escape text for inclusion in HTML.
#[must_use]
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthz,
        ingest::ingest_reading,
        readings::get_readings,
        readings::query_readings,
        tools::describe_tool,
        tools::call_tool,
        analytics::get_analytics,
        chat::chat,
        classifier::classify,
        forecast::refresh_forecast,
        forecast::query_forecast,
        admin::list_services,
        admin::set_service,
        admin::budget_alert,
    ),
    components(
        schemas(
            ingest::IngestResponse,
            readings::ReadingRecord,
            readings::ReadingsQueryBody,
            crate::query::ToolCall,
            crate::query::QueryArguments,
            crate::query::Operation,
            crate::weather::analytics::AnalyticsReport,
            crate::chat::ChatRequest,
            crate::chat::ChatResponse,
            crate::chat::ChatMessage,
            crate::classifier::ClassifyResponse,
            crate::classifier::Label,
            crate::forecast::RefreshResponse,
            crate::forecast::ForecastQuery,
            crate::killswitch::ServiceStatus,
            admin::SetServiceRequest,
            admin::BudgetAlertResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "ingest", description = "Device reading ingestion"),
        (name = "readings", description = "Reading retrieval"),
        (name = "tools", description = "queryWeather tool"),
        (name = "analytics", description = "Interactive dashboard data"),
        (name = "chat", description = "Questions about station data"),
        (name = "classifier", description = "Sky-condition image classification"),
        (name = "forecast", description = "Hourly point forecast"),
        (name = "admin", description = "Kill switch and budget alerts"),
    ),
    info(
        title = "Weather Station API",
        description = "Ingestion, query, dashboard, chat and image classification for a home weather station",
        version = "0.1.0"
    )
)]
struct ApiDoc;

/// Wrap a service's routes in its kill-switch check.
fn guarded(state: &AppState, service: Service, routes: Router<AppState>) -> Router<AppState> {
    routes.layer(middleware::from_fn_with_state(
        Guarded {
            state: state.clone(),
            service,
        },
        killswitch::guard,
    ))
}

/// Apply per-IP rate limiting unless it is switched off.
fn rate_limited(config: &Config, service: Service, routes: Router<AppState>) -> Router<AppState> {
    if config.disable_rate_limiting {
        return routes;
    }
    let Some(limiter) = GovernorConfigBuilder::default()
        .key_extractor(FallbackIpKeyExtractor)
        .per_second(config.rate_limit_per_second)
        .burst_size(config.rate_limit_burst)
        .finish()
    else {
        tracing::error!(service = %service, "Invalid rate limit settings, rate limiting not applied");
        return routes;
    };
    routes.layer(GovernorLayer {
        config: Arc::new(limiter),
    })
}

pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    if config.disable_rate_limiting {
        tracing::warn!("Rate limiting DISABLED");
    } else {
        tracing::info!(
            rate = %format!("{}/s burst {}", config.rate_limit_per_second, config.rate_limit_burst),
            "Rate limiting configured for model-backed routes"
        );
    }

    let mut api_routes = Router::new();
    let mut page_routes = Router::new();

    for service in Service::ALL {
        if !config.mounts(service) {
            continue;
        }
        tracing::info!(service = %service, "Mounting service");

        match service {
            Service::Ingest => {
                let routes = Router::new()
                    .route("/readings", post(ingest::ingest_reading))
                    .layer(RequestBodyLimitLayer::new(JSON_BODY_LIMIT));
                api_routes = api_routes.merge(guarded(&state, service, routes));
            }
            Service::Readings => {
                let routes = Router::new()
                    .route("/readings", get(readings::get_readings))
                    .route("/readings/query", post(readings::query_readings))
                    .layer(RequestBodyLimitLayer::new(JSON_BODY_LIMIT));
                api_routes = api_routes.merge(guarded(&state, service, routes));
            }
            Service::Tools => {
                let routes = Router::new().route(
                    "/tools/query-weather",
                    get(tools::describe_tool).post(tools::call_tool),
                )
                .layer(RequestBodyLimitLayer::new(JSON_BODY_LIMIT));
                api_routes = api_routes.merge(guarded(&state, service, routes));
            }
            Service::Dashboard => {
                let routes = Router::new()
                    .route("/", get(dashboard::dashboard))
                    .route("/dashboard", get(dashboard::dashboard));
                page_routes = page_routes.merge(guarded(&state, service, routes));
            }
            Service::Analytics => {
                let api = Router::new().route("/analytics", get(analytics::get_analytics));
                api_routes = api_routes.merge(guarded(&state, service, api));
                let page = Router::new().route("/analytics", get(analytics::analytics_page));
                page_routes = page_routes.merge(guarded(&state, service, page));
            }
            Service::Chat => {
                let routes = Router::new()
                    .route("/chat", post(chat::chat))
                    .layer(RequestBodyLimitLayer::new(JSON_BODY_LIMIT));
                let routes = rate_limited(&config, service, routes);
                api_routes = api_routes.merge(guarded(&state, service, routes));
            }
            Service::Classifier => {
                let limit = config.classifier_max_image_bytes + MULTIPART_OVERHEAD;
                let routes = Router::new()
                    .route("/classify", post(classifier::classify))
                    .layer(DefaultBodyLimit::max(limit))
                    .layer(RequestBodyLimitLayer::new(limit));
                let routes = rate_limited(&config, service, routes);
                api_routes = api_routes.merge(guarded(&state, service, routes));
                let page = Router::new().route("/classifier", get(classifier::classifier_page));
                page_routes = page_routes.merge(guarded(&state, service, page));
            }
            Service::Forecast => {
                let routes = Router::new()
                    .route("/forecast/refresh", post(forecast::refresh_forecast))
                    .route("/forecast/query", post(forecast::query_forecast))
                    .layer(RequestBodyLimitLayer::new(JSON_BODY_LIMIT));
                api_routes = api_routes.merge(guarded(&state, service, routes));
            }
            Service::Admin => {
                let routes = Router::new()
                    .route("/admin/services", get(admin::list_services))
                    .route("/admin/services/{service}", put(admin::set_service))
                    .route("/admin/budget-alert", post(admin::budget_alert))
                    .layer(RequestBodyLimitLayer::new(JSON_BODY_LIMIT));
                api_routes = api_routes.merge(routes);
            }
        }
    }

    // Health check routes (never guarded or rate limited)
    let health_routes = Router::new().route("/healthz", get(health::healthz));

    // OpenAPI documentation
    let docs_routes = Router::new().merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    Router::new()
        .nest("/api", api_routes)
        .merge(page_routes)
        .merge(health_routes)
        .merge(docs_routes)
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            html_escape(r#"<b>"pico" & 'co'</b>"#),
            "&lt;b&gt;&quot;pico&quot; &amp; &#39;co&#39;&lt;/b&gt;"
        );
        assert_eq!(html_escape("pico-1"), "pico-1");
    }
}
