use crate::{AppState, handlers::admin};
use axum::{
    Router,
    routing::{get, put},
};

/// Admin Router Module
///
/// Moderation, platform settings and dashboard analytics. Nested under `/admin` and wrapped
/// in `admin_middleware`, which rejects anyone without the ADMIN or SUPER_ADMIN role.
/// Rules about which admin may touch which account live in the handlers.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/analytics", get(admin::analytics))
        .route("/settings", get(admin::list_settings))
        .route("/settings/{key}", put(admin::update_setting))
        // --- Accounts ---
        // Suspending or deleting a user also revokes their sessions.
        .route("/users/{id}/status", put(admin::update_user_status))
        .route("/users/{id}/role", put(admin::update_user_role))
        // --- Moderation ---
        // Lists vendors in every status, unlike the public directory.
        .route("/vendors", get(admin::list_vendors))
        .route("/vendors/{id}/status", put(admin::update_vendor_status))
        .route("/reviews/{id}/status", put(admin::update_review_status))
        .route("/posts/{id}/status", put(admin::update_post_status))
        .route("/comments/{id}/status", put(admin::update_comment_status))
}
