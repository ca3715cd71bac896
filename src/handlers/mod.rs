//! HTTP handlers, one module per API area.
//!
//! Handlers stay thin: extract, validate, call the repository and the service traits on
//! `AppState`, and map the result onto a response DTO. Every failure is an `ApiError`.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
};
use chrono::Utc;

use crate::{
    AppState,
    auth::ClientInfo,
    models::{EndpointIndex, HealthResponse, IndexResponse},
    throttle::client_ip,
};

pub mod admin;
pub mod auth;
pub mod community;
pub mod oauth;
pub mod surveys;
pub mod upload;
pub mod users;
pub mod vendors;

/// Session metadata taken from the request headers.
pub(crate) fn client_info(headers: &HeaderMap, device_info: Option<String>) -> ClientInfo {
    ClientInfo {
        device_info,
        ip_address: Some(client_ip(headers)),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.chars().take(500).collect()),
    }
}

/// health
///
/// Liveness plus a database round trip. Always answers 200 so load balancers can tell a
/// degraded database apart from a dead process.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match state.repo.ping().await {
        Ok(()) => "CONNECTED",
        Err(e) => {
            tracing::error!(error = %e, "health check database failure");
            "DISCONNECTED"
        }
    };

    Json(HealthResponse {
        status: "success".to_string(),
        message: "Meyden Backend API is running".to_string(),
        timestamp: Utc::now(),
        environment: state.config.env.as_str().to_string(),
        database: database.to_string(),
    })
}

/// index
///
/// Lists where each API area is mounted.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "API index", body = IndexResponse))
)]
pub async fn index(State(state): State<AppState>) -> Json<IndexResponse> {
    let config = &state.config;
    let prefix = config.api_prefix.as_str();
    let version = prefix.rsplit('/').next().unwrap_or_default().to_string();

    Json(IndexResponse {
        message: "Meyden Backend API".to_string(),
        version,
        environment: config.env.as_str().to_string(),
        timestamp: Utc::now(),
        endpoints: EndpointIndex {
            auth: format!("{prefix}/auth"),
            users: format!("{prefix}/users"),
            vendors: format!("{prefix}/vendors"),
            community: config
                .features
                .community
                .then(|| format!("{prefix}/community")),
            ai_readiness: config
                .features
                .ai_readiness
                .then(|| format!("{prefix}/ai-readiness")),
            admin: format!("{prefix}/admin"),
            upload: format!("{prefix}/upload"),
            settings: format!("{prefix}/settings"),
            health: "/health".to_string(),
            csrf_token: format!("{prefix}/csrf-token"),
            docs: "/swagger-ui".to_string(),
        },
    })
}
