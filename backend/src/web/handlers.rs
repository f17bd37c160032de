//! HTTP endpoint handlers.
//!
//! The signup handler only enqueues a mail and returns; delivery happens in
//! the mailer process.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::opengraph::{OpenGraphClient, OpenGraphError, PreviewOverrides};
use crate::signup::{SignupError, SignupRequest, SignupService};
use crate::Config;

/// Embedded OpenAPI document.
const OPENAPI_SPEC: &str = include_str!("openapi.json");

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub signup: SignupService,
    pub opengraph: OpenGraphClient,
    pub openapi: Arc<Value>,
}

impl AppState {
    pub fn new(
        config: Config,
        signup: SignupService,
        opengraph: OpenGraphClient,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            config: Arc::new(config),
            signup,
            opengraph,
            openapi: Arc::new(serde_json::from_str(OPENAPI_SPEC)?),
        })
    }
}

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for OpenGraphError {
    fn into_response(self) -> Response {
        match self {
            OpenGraphError::InvalidUrl(_) => error_response(StatusCode::BAD_REQUEST, self.to_string()),
            OpenGraphError::Fetch(_) | OpenGraphError::UpstreamStatus(_) => {
                error_response(StatusCode::BAD_GATEWAY, "Failed to get OpenGraph data")
            }
            OpenGraphError::Render(_) => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to render preview")
            }
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Signup
// =============================================================================

/// Signup endpoint.
///
/// Returns once the confirmation mail is on the queue.
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Response {
    info!("signup_request_received");

    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "signup_body_invalid");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request body format");
        }
    };

    match state.signup.sign_up(request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(SignupError::MissingEmail) => error_response(StatusCode::BAD_REQUEST, "email is required"),
        Err(e) => {
            error!(error = %e, "signup_failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to signup")
        }
    }
}

// =============================================================================
// Open Graph
// =============================================================================

/// Query parameters for the preview endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct OpenGraphParams {
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

/// Query parameters for the metadata endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct MetadataParams {
    pub url: Option<String>,
}

fn required_url(url: Option<String>) -> Result<String, Response> {
    url.filter(|u| !u.trim().is_empty())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "url is required"))
}

/// Preview page endpoint.
pub async fn opengraph(
    State(state): State<AppState>,
    Query(params): Query<OpenGraphParams>,
) -> Response {
    let url = match required_url(params.url) {
        Ok(url) => url,
        Err(response) => return response,
    };

    let overrides = PreviewOverrides {
        title: params.title,
        description: params.description,
        image: params.image,
    };

    match state.opengraph.preview(&url, &overrides).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(url = %url, error = %e, "opengraph_preview_failed");
            e.into_response()
        }
    }
}

/// Metadata endpoint.
pub async fn metadata(
    State(state): State<AppState>,
    Query(params): Query<MetadataParams>,
) -> Response {
    let url = match required_url(params.url) {
        Ok(url) => url,
        Err(response) => return response,
    };

    match state.opengraph.metadata(&url).await {
        Ok(metadata) => Json(metadata).into_response(),
        Err(e) => {
            error!(url = %url, error = %e, "opengraph_metadata_failed");
            e.into_response()
        }
    }
}

// =============================================================================
// OpenAPI
// =============================================================================

/// Pretty-printed OpenAPI document.
pub async fn openapi_spec(State(state): State<AppState>) -> Response {
    match serde_json::to_string_pretty(state.openapi.as_ref()) {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            error!(error = %e, "openapi_serialize_failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to render OpenAPI spec")
        }
    }
}
