use crate::{AppState, config::AppConfig, csrf, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that need no token: the credential flows, the vendor directory, read-only
/// community and survey content, public settings and the CSRF token.
pub fn public_routes(config: &AppConfig) -> Router<AppState> {
    let mut router = Router::new()
        // GET /csrf-token
        // Issues the double-submit token state-changing requests must echo back.
        .route("/csrf-token", get(csrf::csrf_token))
        // --- Credentials ---
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        // POST /auth/logout
        // Public so a stale token still gets a clean 200; only a live session is deleted.
        .route("/auth/logout", post(handlers::auth::logout))
        // POST /auth/refresh
        // Rotates both tokens of a session. The old refresh token stops working.
        .route("/auth/refresh", post(handlers::auth::refresh))
        // GET is the link from the verification email, POST the same for API clients.
        .route(
            "/auth/verify-email",
            get(handlers::auth::verify_email_link).post(handlers::auth::verify_email),
        )
        .route("/auth/forgot-password", post(handlers::auth::forgot_password))
        .route("/auth/reset-password", post(handlers::auth::reset_password))
        // --- OAuth ---
        .route("/auth/oauth/google", get(handlers::oauth::google_start))
        .route(
            "/auth/oauth/google/callback",
            get(handlers::oauth::google_callback),
        )
        .route("/auth/oauth/status", get(handlers::oauth::oauth_status))
        // --- Vendor directory ---
        // Only ACTIVE vendors and APPROVED public reviews are ever returned here.
        .route("/vendors", get(handlers::vendors::list_vendors))
        .route("/vendors/popular/list", get(handlers::vendors::popular_vendors))
        .route("/vendors/{id}", get(handlers::vendors::get_vendor))
        .route("/vendors/{id}/reviews", get(handlers::vendors::vendor_reviews))
        .route("/vendors/{id}/contact", post(handlers::vendors::contact_vendor))
        // GET /settings
        // Settings flagged public, e.g. for the frontend footer.
        .route("/settings", get(handlers::admin::public_settings));

    if config.features.community {
        router = router
            .route("/community/posts", get(handlers::community::list_posts))
            .route("/community/posts/{id}", get(handlers::community::get_post))
            .route(
                "/community/categories",
                get(handlers::community::list_categories),
            );
    }

    if config.features.ai_readiness {
        router = router
            .route("/ai-readiness/surveys", get(handlers::surveys::list_surveys))
            .route(
                "/ai-readiness/surveys/{id}",
                get(handlers::surveys::get_survey),
            );
    }

    router
}
