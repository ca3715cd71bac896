use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef, Request},
    http::{HeaderName, HeaderValue, Method, header},
    middleware::{self, Next},
    response::Response,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core services, one per concern.
pub mod auth;
pub mod config;
pub mod csrf;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod models;
pub mod oauth;
pub mod pagination;
pub mod repository;
pub mod sanitize;
pub mod scoring;
pub mod storage;
pub mod throttle;
pub mod validation;

// Routers grouped by access level (public, authenticated, admin).
pub mod routes;
use auth::{AdminUser, AuthUser};
use error::ApiError;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use mailer::{MailerState, MemoryMailer};
pub use oauth::{GoogleOAuthClient, OAuthProviderState, StaticOAuthProvider};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};
pub use throttle::{Throttle, ThrottleState};

/// Largest request body accepted on any route.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// ApiDoc
///
/// OpenAPI document for every handler, served at `/api-docs/openapi.json` and browsable
/// through the Swagger UI.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health, handlers::index, csrf::csrf_token,
        handlers::auth::register, handlers::auth::login, handlers::auth::logout,
        handlers::auth::refresh, handlers::auth::verify_email, handlers::auth::verify_email_link,
        handlers::auth::forgot_password, handlers::auth::reset_password, handlers::auth::me,
        handlers::oauth::google_start, handlers::oauth::google_callback,
        handlers::oauth::oauth_status,
        handlers::users::get_profile, handlers::users::update_profile,
        handlers::users::list_users, handlers::users::get_user,
        handlers::vendors::list_vendors, handlers::vendors::popular_vendors,
        handlers::vendors::get_vendor, handlers::vendors::vendor_reviews,
        handlers::vendors::create_vendor, handlers::vendors::create_review,
        handlers::vendors::contact_vendor,
        handlers::community::list_posts, handlers::community::get_post,
        handlers::community::create_post, handlers::community::create_comment,
        handlers::community::list_categories, handlers::community::follow_category,
        handlers::community::unfollow_category, handlers::community::follow_post,
        handlers::community::unfollow_post, handlers::community::following,
        handlers::surveys::list_surveys, handlers::surveys::get_survey,
        handlers::surveys::create_survey, handlers::surveys::submit_response,
        handlers::surveys::my_responses,
        handlers::upload::presigned_url,
        handlers::admin::analytics, handlers::admin::list_settings,
        handlers::admin::public_settings, handlers::admin::update_setting,
        handlers::admin::update_user_status, handlers::admin::update_user_role,
        handlers::admin::list_vendors, handlers::admin::update_vendor_status,
        handlers::admin::update_review_status, handlers::admin::update_post_status,
        handlers::admin::update_comment_status,
    ),
    components(
        schemas(
            error::ErrorBody, error::FieldError, models::MessageResponse,
            csrf::CsrfTokenResponse, models::HealthResponse, models::IndexResponse,
            models::RegisterRequest, models::RegisterResponse, models::LoginRequest,
            models::LoginResponse, models::RefreshRequest, models::RefreshResponse,
            models::VerifyEmailRequest, models::ForgotPasswordRequest,
            models::ResetPasswordRequest, models::MeResponse, models::OAuthStatusResponse,
            models::PublicUser, models::Profile, models::UserDetailResponse,
            models::UserListResponse, models::UpdateProfileRequest,
            models::UpdateProfileResponse, models::UserUpdatedResponse,
            models::Vendor, models::VendorService, models::ReviewView,
            models::VendorListResponse, models::VendorDetailResponse,
            models::CreateVendorRequest, models::CreateReviewRequest,
            models::VendorContactRequest, models::ReviewResponse,
            models::Category, models::PostView, models::CommentThread,
            models::PostDetailResponse, models::PostListResponse,
            models::CreatePostRequest, models::CreateCommentRequest,
            models::FollowResponse, models::FollowingResponse,
            models::Survey, models::Question, models::SurveyListResponse,
            models::SurveyDetailResponse, models::CreateSurveyRequest,
            models::SubmitResponseRequest, models::SubmitResponseResponse,
            models::MyResponsesResponse,
            models::PresignedUrlRequest, models::PresignedUrlResponse,
            models::AnalyticsResponse, models::PlatformSetting, models::SettingsResponse,
            models::UpdateSettingRequest, models::UpdateStatusRequest,
            models::UpdateRoleRequest,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "meyden", description = "Meyden platform API")
    )
)]
struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by protected paths.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// AppState
///
/// The single shared container of services and configuration, cloned into every request.
/// Each service sits behind a trait object so tests can swap in in-memory doubles.
#[derive(Clone)]
pub struct AppState {
    /// Relational store (Postgres in production).
    pub repo: RepositoryState,
    /// Object storage for presigned uploads.
    pub storage: StorageState,
    /// Outgoing transactional email.
    pub mailer: MailerState,
    /// Google sign-in.
    pub google: OAuthProviderState,
    /// Login and registration attempt limits.
    pub throttle: ThrottleState,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// The auth extractors and the CSRF layer only need these parts of the state.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Runs the `AuthUser` extractor ahead of the handler. A missing, expired or revoked token
/// is rejected here with 401 and the handler never runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// admin_middleware
///
/// Same as `auth_middleware`, plus the admin role check (403 otherwise).
async fn admin_middleware(_admin: AdminUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

async fn route_not_found() -> ApiError {
    ApiError::not_found("ROUTE_NOT_FOUND", "Route not found")
}

/// Explicit origins when credentials are allowed; browsers reject `*` with credentials.
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(csrf::CSRF_HEADER),
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([HeaderName::from_static("x-request-id")]);

    if config.cors_credentials {
        layer
            .allow_origin(AllowOrigin::list(origins))
            .allow_credentials(true)
    } else if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

/// create_router
///
/// Assembles every router under the API prefix, applies the global middleware and binds
/// the shared state.
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    // Header name constant for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 1. API Router Assembly (mounted under the versioned prefix)
    let api = Router::new()
        .merge(public::public_routes(&config))
        .merge(
            authenticated::authenticated_routes(&config).route_layer(
                middleware::from_fn_with_state(state.clone(), auth_middleware),
            ),
        )
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_middleware,
            )),
        )
        .layer(middleware::from_fn_with_state(
            state.throttle.clone(),
            throttle::api_rate_limit,
        ));

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", axum::routing::get(handlers::index))
        .route("/health", axum::routing::get(handlers::health))
        .nest(&config.api_prefix, api)
        .fallback(route_not_found)
        // Sees the full path, so the prefix check inside the middleware works.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            csrf::csrf_middleware,
        ))
        .with_state(state);

    // 3. Hardening, then the observability and correlation stack (outermost).
    base_router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing, with the request ID on every span.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS (outermost, so preflights never reach the rest of the stack)
        .layer(cors_layer(&config))
}

/// trace_span_logger
///
/// Span for one request, tagged with the `x-request-id` set by the layer above so every
/// log line of a request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
