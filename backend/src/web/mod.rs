//! Web server module for the public API.
//!
//! This module provides:
//! - Signup, which enqueues a confirmation mail and returns immediately
//! - Open Graph metadata and preview pages
//! - The OpenAPI document and a health check

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    health, metadata, openapi_spec, opengraph, signup, AppState, ErrorResponse, HealthResponse,
    MetadataParams, OpenGraphParams,
};

/// Build the API router. Everything but `/health` lives under the configured path.
pub fn router(state: AppState) -> Router {
    let path = state.config.api_path.clone();

    Router::new()
        .route("/health", get(health))
        .route(&format!("{path}/user/signup"), post(signup))
        .route(&format!("{path}/opengraph"), get(opengraph))
        .route(&format!("{path}/metadata"), get(metadata))
        .route(&format!("{path}/openapi-spec.json"), get(openapi_spec))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
