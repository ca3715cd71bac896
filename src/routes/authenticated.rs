use crate::{AppState, config::AppConfig, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Every route here sits behind `auth_middleware`, so a request only reaches a handler
/// with a valid access token tied to a live session. Ownership and role rules stay in
/// the handlers.
pub fn authenticated_routes(config: &AppConfig) -> Router<AppState> {
    let mut router = Router::new()
        .route("/auth/me", get(handlers::auth::me))
        // --- Users ---
        .route(
            "/users/profile",
            get(handlers::users::get_profile).put(handlers::users::update_profile),
        )
        // GET /users is admin-only; the handler extracts `AdminUser`.
        .route("/users", get(handlers::users::list_users))
        .route("/users/{id}", get(handlers::users::get_user))
        // --- Vendors ---
        .route("/vendors", post(handlers::vendors::create_vendor))
        .route("/vendors/{id}/reviews", post(handlers::vendors::create_review))
        // POST /upload
        // Presigned PUT URL for a direct upload to object storage.
        .route("/upload", post(handlers::upload::presigned_url));

    if config.features.community {
        router = router
            .route("/community/posts", post(handlers::community::create_post))
            .route("/community/comments", post(handlers::community::create_comment))
            .route(
                "/community/categories/{id}/follow",
                post(handlers::community::follow_category)
                    .delete(handlers::community::unfollow_category),
            )
            .route(
                "/community/posts/{id}/follow",
                post(handlers::community::follow_post).delete(handlers::community::unfollow_post),
            )
            .route("/community/following", get(handlers::community::following));
    }

    if config.features.ai_readiness {
        router = router
            // Survey authoring is admin-only; the handler extracts `AdminUser`.
            .route("/ai-readiness/surveys", post(handlers::surveys::create_survey))
            .route("/ai-readiness/responses", post(handlers::surveys::submit_response))
            .route(
                "/ai-readiness/responses/my",
                get(handlers::surveys::my_responses),
            );
    }

    router
}
