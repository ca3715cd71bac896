use axum::{
    Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AdminUser, AuthUser},
    error::{ApiError, ApiResult},
    models::{
        AdminVendorFilter, Analytics, AnalyticsResponse, CommentResponse, CommunityStats,
        ContentStatus, PostResponse, PublicUser, ReviewResponse, ReviewStatus, Role,
        SettingResponse, SettingsResponse, UpdateRoleRequest, UpdateSettingRequest,
        UpdateStatusRequest, UserStatus, UserUpdatedResponse, VendorListResponse, VendorResponse,
        VendorStatus,
    },
    pagination::PageQuery,
    sanitize::strip_tags_opt,
    validation::ValidatedJson,
};

const DEFAULT_PAGE_SIZE: i64 = 20;

/// Parses a moderation status, reporting the allowed values on failure.
fn parse_status<T>(raw: &str, parse: fn(&str) -> Option<T>, allowed: &[&str]) -> ApiResult<T> {
    parse(raw.trim()).ok_or_else(|| {
        ApiError::invalid_field(
            "status",
            &format!("must be one of: {}", allowed.join(", ")),
        )
    })
}

/// analytics
///
/// Platform-wide counters for the admin dashboard.
#[utoipa::path(
    get,
    path = "/api/v1/admin/analytics",
    responses(
        (status = 200, description = "Dashboard counters", body = AnalyticsResponse),
        (status = 403, description = "Admin access required")
    ),
    security(("bearer_auth" = []))
)]
pub async fn analytics(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> ApiResult<Json<AnalyticsResponse>> {
    let users = state.repo.count_users_by_status().await?;
    let vendors = state.repo.count_vendors_by_status().await?;
    let surveys = state.repo.survey_response_stats().await?;
    let total_posts = state.repo.count_published_posts().await?;

    Ok(Json(AnalyticsResponse {
        analytics: Analytics {
            users: users.into(),
            vendors: vendors.into(),
            surveys,
            community: CommunityStats { total_posts },
        },
    }))
}

/// list_settings
///
/// Every platform setting, private ones included.
#[utoipa::path(
    get,
    path = "/api/v1/admin/settings",
    responses((status = 200, description = "All settings", body = SettingsResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_settings(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> ApiResult<Json<SettingsResponse>> {
    let settings = state.repo.list_settings(false).await?;
    Ok(Json(SettingsResponse { settings }))
}

/// public_settings
///
/// Settings flagged public, readable without a token.
#[utoipa::path(
    get,
    path = "/api/v1/settings",
    responses((status = 200, description = "Public settings", body = SettingsResponse))
)]
pub async fn public_settings(State(state): State<AppState>) -> ApiResult<Json<SettingsResponse>> {
    let settings = state.repo.list_settings(true).await?;
    Ok(Json(SettingsResponse { settings }))
}

fn valid_setting_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 100
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// update_setting
///
/// Creates or replaces a setting.
#[utoipa::path(
    put,
    path = "/api/v1/admin/settings/{key}",
    params(("key" = String, Path, description = "Setting key")),
    request_body = UpdateSettingRequest,
    responses(
        (status = 200, description = "Setting stored", body = SettingResponse),
        (status = 400, description = "Invalid key or value")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_setting(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(key): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateSettingRequest>,
) -> ApiResult<Json<SettingResponse>> {
    if !valid_setting_key(&key) {
        return Err(ApiError::invalid_field(
            "key",
            "must be 1 to 100 letters, digits, '.', '_' or '-'",
        ));
    }
    let update = UpdateSettingRequest {
        description: strip_tags_opt(req.description),
        ..req
    };
    let setting = state.repo.upsert_setting(&key, &update).await?;

    tracing::info!(key = %key, admin_id = %admin.id, "setting updated");
    Ok(Json(SettingResponse {
        message: "Setting updated successfully".to_string(),
        setting,
    }))
}

fn user_not_found() -> ApiError {
    ApiError::not_found("USER_NOT_FOUND", "User not found")
}

/// Guards shared by status and role changes: never on yourself, and accounts at admin level
/// or above are only touched by a super admin.
async fn guard_target(state: &AppState, admin: &AuthUser, target: Uuid) -> ApiResult<()> {
    if admin.id == target {
        return Err(ApiError::bad_request(
            "CANNOT_MODIFY_SELF",
            "You cannot change your own account",
        ));
    }
    let user = state
        .repo
        .find_user_by_id(target)
        .await?
        .ok_or_else(user_not_found)?;
    if user.role().is_admin() && admin.role != Role::SuperAdmin {
        return Err(ApiError::forbidden(
            "INSUFFICIENT_PERMISSIONS",
            "Only a super admin can modify admin accounts",
        ));
    }
    Ok(())
}

/// update_user_status
///
/// Suspending or deleting an account also revokes all of its sessions.
#[utoipa::path(
    put,
    path = "/api/v1/admin/users/{id}/status",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = UserUpdatedResponse),
        (status = 400, description = "Invalid status or own account"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user_status(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateStatusRequest>,
) -> ApiResult<Json<UserUpdatedResponse>> {
    let status = parse_status(&req.status, UserStatus::parse, UserStatus::ALL)?;
    guard_target(&state, &admin, id).await?;

    let user = state
        .repo
        .set_user_status(id, status.as_str())
        .await?
        .ok_or_else(user_not_found)?;

    if matches!(status, UserStatus::Suspended | UserStatus::Deleted) {
        let revoked = state.repo.delete_user_sessions(id).await?;
        tracing::info!(user_id = %id, revoked, "sessions revoked");
    }

    tracing::info!(user_id = %id, status = %status, admin_id = %admin.id, "user status changed");
    Ok(Json(UserUpdatedResponse {
        message: "User status updated successfully".to_string(),
        user: PublicUser::from(&user),
    }))
}

/// update_user_role
#[utoipa::path(
    put,
    path = "/api/v1/admin/users/{id}/role",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = UserUpdatedResponse),
        (status = 403, description = "Super admin required"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user_role(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateRoleRequest>,
) -> ApiResult<Json<UserUpdatedResponse>> {
    let role = Role::parse(req.role.trim()).ok_or_else(|| {
        ApiError::invalid_field("role", &format!("must be one of: {}", Role::ALL.join(", ")))
    })?;
    if role == Role::SuperAdmin && admin.role != Role::SuperAdmin {
        return Err(ApiError::forbidden(
            "INSUFFICIENT_PERMISSIONS",
            "Only a super admin can grant SUPER_ADMIN",
        ));
    }
    guard_target(&state, &admin, id).await?;

    let user = state
        .repo
        .set_user_role(id, role.as_str())
        .await?
        .ok_or_else(user_not_found)?;

    tracing::info!(user_id = %id, role = %role, admin_id = %admin.id, "user role changed");
    Ok(Json(UserUpdatedResponse {
        message: "User role updated successfully".to_string(),
        user: PublicUser::from(&user),
    }))
}

/// list_vendors
///
/// Every vendor regardless of status, optionally filtered by one.
#[utoipa::path(
    get,
    path = "/api/v1/admin/vendors",
    params(AdminVendorFilter, PageQuery),
    responses((status = 200, description = "Vendors", body = VendorListResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_vendors(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(filter): Query<AdminVendorFilter>,
    Query(paging): Query<PageQuery>,
) -> ApiResult<Json<VendorListResponse>> {
    let page = paging.resolve(DEFAULT_PAGE_SIZE);
    let status = filter
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let (vendors, total) = state.repo.list_vendors_by_status(status, page).await?;
    Ok(Json(VendorListResponse {
        vendors,
        pagination: page.meta(total),
    }))
}

/// update_vendor_status
///
/// Approves, suspends or rejects a listing.
#[utoipa::path(
    put,
    path = "/api/v1/admin/vendors/{id}/status",
    params(("id" = Uuid, Path, description = "Vendor ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = VendorResponse),
        (status = 404, description = "Vendor not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_vendor_status(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateStatusRequest>,
) -> ApiResult<Json<VendorResponse>> {
    let status = parse_status(&req.status, VendorStatus::parse, VendorStatus::ALL)?;
    let vendor = state
        .repo
        .set_vendor_status(id, status.as_str())
        .await?
        .ok_or_else(|| ApiError::not_found("VENDOR_NOT_FOUND", "Vendor not found"))?;

    tracing::info!(vendor_id = %id, status = %status, admin_id = %admin.id, "vendor status changed");
    Ok(Json(VendorResponse {
        message: "Vendor status updated successfully".to_string(),
        vendor,
    }))
}

/// update_review_status
///
/// Moderates a review and recomputes the vendor's rating from what is now approved.
#[utoipa::path(
    put,
    path = "/api/v1/admin/reviews/{id}/status",
    params(("id" = Uuid, Path, description = "Review ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = ReviewResponse),
        (status = 404, description = "Review not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_review_status(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateStatusRequest>,
) -> ApiResult<Json<ReviewResponse>> {
    let status = parse_status(&req.status, ReviewStatus::parse, ReviewStatus::ALL)?;
    let review = state
        .repo
        .set_review_status(id, status.as_str())
        .await?
        .ok_or_else(|| ApiError::not_found("REVIEW_NOT_FOUND", "Review not found"))?;
    state.repo.refresh_vendor_rating(review.vendor_id).await?;

    tracing::info!(review_id = %id, status = %status, admin_id = %admin.id, "review moderated");
    Ok(Json(ReviewResponse {
        message: "Review status updated successfully".to_string(),
        review,
    }))
}

/// update_post_status
#[utoipa::path(
    put,
    path = "/api/v1/admin/posts/{id}/status",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = PostResponse),
        (status = 404, description = "Post not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_post_status(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateStatusRequest>,
) -> ApiResult<Json<PostResponse>> {
    let status = parse_status(&req.status, ContentStatus::parse, ContentStatus::ALL)?;
    let post = state
        .repo
        .set_post_status(id, status.as_str())
        .await?
        .ok_or_else(|| ApiError::not_found("POST_NOT_FOUND", "Post not found"))?;

    tracing::info!(post_id = %id, status = %status, admin_id = %admin.id, "post moderated");
    Ok(Json(PostResponse {
        message: "Post status updated successfully".to_string(),
        post,
    }))
}

/// update_comment_status
///
/// Hiding or deleting a comment also corrects the post's comment count.
#[utoipa::path(
    put,
    path = "/api/v1/admin/comments/{id}/status",
    params(("id" = Uuid, Path, description = "Comment ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = CommentResponse),
        (status = 404, description = "Comment not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_comment_status(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateStatusRequest>,
) -> ApiResult<Json<CommentResponse>> {
    let status = parse_status(&req.status, ContentStatus::parse, ContentStatus::ALL)?;
    let comment = state
        .repo
        .set_comment_status(id, status.as_str())
        .await?
        .ok_or_else(|| ApiError::not_found("COMMENT_NOT_FOUND", "Comment not found"))?;

    tracing::info!(comment_id = %id, status = %status, admin_id = %admin.id, "comment moderated");
    Ok(Json(CommentResponse {
        message: "Comment status updated successfully".to_string(),
        comment,
    }))
}
