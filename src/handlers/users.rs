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
        PublicUser, UpdateProfileRequest, UpdateProfileResponse, User, UserDetail,
        UserDetailResponse, UserFilter, UserListResponse, VendorSummary,
    },
    pagination::PageQuery,
    sanitize::{strip_tags, strip_tags_opt},
    validation::ValidatedJson,
};

const DEFAULT_PAGE_SIZE: i64 = 20;

fn user_not_found() -> ApiError {
    ApiError::not_found("USER_NOT_FOUND", "User not found")
}

async fn user_detail(state: &AppState, user: &User) -> ApiResult<UserDetail> {
    let profile = state.repo.get_profile(user.id).await?;
    let vendor = state.repo.find_vendor_by_user(user.id).await?;
    Ok(UserDetail {
        user: PublicUser::from(user),
        profile,
        vendor: vendor.as_ref().map(VendorSummary::from),
    })
}

/// get_profile
///
/// The caller's account with profile and vendor listing.
#[utoipa::path(
    get,
    path = "/api/v1/users/profile",
    responses(
        (status = 200, description = "Own profile", body = UserDetailResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_profile(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<UserDetailResponse>> {
    let user = state
        .repo
        .find_user_by_id(id)
        .await?
        .ok_or_else(user_not_found)?;
    Ok(Json(UserDetailResponse {
        user: user_detail(&state, &user).await?,
    }))
}

/// update_profile
///
/// Partial update of names and profile fields. Free text is stripped of markup.
#[utoipa::path(
    put,
    path = "/api/v1/users/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UpdateProfileResponse),
        (status = 400, description = "Validation failed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_profile(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> ApiResult<Json<UpdateProfileResponse>> {
    let first_name = req.first_name.as_deref().map(strip_tags);
    let last_name = req.last_name.as_deref().map(strip_tags);
    if first_name.is_some() || last_name.is_some() {
        state
            .repo
            .update_user_names(id, first_name.as_deref(), last_name.as_deref())
            .await?;
    }

    let update = UpdateProfileRequest {
        bio: strip_tags_opt(req.bio),
        company: strip_tags_opt(req.company),
        job_title: strip_tags_opt(req.job_title),
        ..req
    };
    let profile = state.repo.upsert_profile(id, &update).await?;

    tracing::info!(user_id = %id, "profile updated");
    Ok(Json(UpdateProfileResponse {
        message: "Profile updated successfully".to_string(),
        profile,
    }))
}

/// list_users
///
/// Admin listing with optional `role` and `status` filters.
#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(UserFilter, PageQuery),
    responses(
        (status = 200, description = "Users", body = UserListResponse),
        (status = 403, description = "Admin access required")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(filter): Query<UserFilter>,
    Query(paging): Query<PageQuery>,
) -> ApiResult<Json<UserListResponse>> {
    let page = paging.resolve(DEFAULT_PAGE_SIZE);
    let (users, total) = state
        .repo
        .list_users(filter.role.as_deref(), filter.status.as_deref(), page)
        .await?;
    Ok(Json(UserListResponse {
        users: users.iter().map(PublicUser::from).collect(),
        pagination: page.meta(total),
    }))
}

/// get_user
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = UserDetailResponse),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    _caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserDetailResponse>> {
    let user = state
        .repo
        .find_user_by_id(id)
        .await?
        .ok_or_else(user_not_found)?;
    Ok(Json(UserDetailResponse {
        user: user_detail(&state, &user).await?,
    }))
}
