//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

use crate::config::Settings;
use crate::handlers;
use crate::state::SharedState;
use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    let cors = build_cors_layer(settings);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    Router::new()
        .route("/health", get(handlers::health))
        // Connection registry
        .route("/api/connections", post(handlers::register_connection))
        .route("/api/connections", get(handlers::list_connections))
        .route("/api/connections/{id}", delete(handlers::remove_connection))
        .route("/api/connections/{id}/test", post(handlers::test_connection))
        // Pipeline
        .route("/api/schema/extract", post(handlers::extract_schema))
        .route("/api/diff", post(handlers::diff_schemas))
        .route("/api/migration/generate", post(handlers::generate_migration))
        .route("/api/migration/validate", post(handlers::validate_migration))
        .route(
            "/api/migration/quick-validate",
            post(handlers::quick_validate),
        )
        .layer(middleware)
        .with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE])
    }
}
