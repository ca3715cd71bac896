use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiError, ApiResult, RepositoryError},
    mailer::{self, deliver},
    models::{
        CreateReviewRequest, CreateVendorRequest, LimitQuery, MessageResponse,
        PopularVendorsResponse, ReviewListResponse, ReviewResponse, Vendor, VendorContactRequest,
        VendorDetail, VendorDetailResponse, VendorFilter, VendorListResponse, VendorResponse,
        VendorSearch, VendorStatus,
    },
    pagination::{MAX_LIMIT, Page, PageQuery},
    sanitize::{strip_tags, strip_tags_opt},
    validation::{ValidatedJson, normalize_email},
};

const DEFAULT_PAGE_SIZE: i64 = 20;
const DEFAULT_REVIEW_PAGE_SIZE: i64 = 10;
const DEFAULT_POPULAR_LIMIT: i64 = 10;
// Reviews embedded in the vendor detail payload.
const DETAIL_REVIEW_COUNT: i64 = 20;

/// Loads a vendor that the public may see: 404 when missing, a distinct 404 when it exists
/// but is not `ACTIVE`.
async fn visible_vendor(state: &AppState, id: Uuid) -> ApiResult<Vendor> {
    let vendor = state
        .repo
        .find_vendor(id)
        .await?
        .ok_or_else(|| ApiError::not_found("VENDOR_NOT_FOUND", "Vendor not found"))?;
    if vendor.status != VendorStatus::Active.as_str() {
        return Err(ApiError::not_found(
            "VENDOR_UNAVAILABLE",
            "Vendor is not available",
        ));
    }
    Ok(vendor)
}

/// list_vendors
///
/// Public directory of active vendors, best rated first.
#[utoipa::path(
    get,
    path = "/api/v1/vendors",
    params(VendorFilter, PageQuery),
    responses((status = 200, description = "Active vendors", body = VendorListResponse))
)]
pub async fn list_vendors(
    State(state): State<AppState>,
    Query(filter): Query<VendorFilter>,
    Query(paging): Query<PageQuery>,
) -> ApiResult<Json<VendorListResponse>> {
    let page = paging.resolve(DEFAULT_PAGE_SIZE);
    let search = VendorSearch::from(filter);
    let (vendors, total) = state.repo.list_vendors(&search, page).await?;
    Ok(Json(VendorListResponse {
        vendors,
        pagination: page.meta(total),
    }))
}

/// popular_vendors
///
/// Active vendors that have at least one review.
#[utoipa::path(
    get,
    path = "/api/v1/vendors/popular/list",
    params(LimitQuery),
    responses((status = 200, description = "Popular vendors", body = PopularVendorsResponse))
)]
pub async fn popular_vendors(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<PopularVendorsResponse>> {
    let limit = Page::from_raw(None, query.limit.as_deref(), DEFAULT_POPULAR_LIMIT)
        .limit
        .min(MAX_LIMIT);
    let vendors = state.repo.popular_vendors(limit).await?;
    Ok(Json(PopularVendorsResponse { vendors }))
}

/// get_vendor
///
/// Vendor detail with its active services and latest approved reviews.
#[utoipa::path(
    get,
    path = "/api/v1/vendors/{id}",
    params(("id" = Uuid, Path, description = "Vendor ID")),
    responses(
        (status = 200, description = "Vendor", body = VendorDetailResponse),
        (status = 404, description = "Vendor not found or unavailable")
    )
)]
pub async fn get_vendor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<VendorDetailResponse>> {
    let vendor = visible_vendor(&state, id).await?;
    let services = state.repo.vendor_services(id).await?;
    let (reviews, _) = state
        .repo
        .list_public_reviews(
            id,
            Page {
                page: 1,
                limit: DETAIL_REVIEW_COUNT,
            },
        )
        .await?;

    Ok(Json(VendorDetailResponse {
        vendor: VendorDetail {
            vendor,
            services,
            reviews,
        },
    }))
}

/// vendor_reviews
#[utoipa::path(
    get,
    path = "/api/v1/vendors/{id}/reviews",
    params(("id" = Uuid, Path, description = "Vendor ID"), PageQuery),
    responses((status = 200, description = "Approved public reviews", body = ReviewListResponse))
)]
pub async fn vendor_reviews(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(paging): Query<PageQuery>,
) -> ApiResult<Json<ReviewListResponse>> {
    let page = paging.resolve(DEFAULT_REVIEW_PAGE_SIZE);
    let (reviews, total) = state.repo.list_public_reviews(id, page).await?;
    Ok(Json(ReviewListResponse {
        reviews,
        pagination: page.meta(total),
    }))
}

fn vendor_exists() -> ApiError {
    ApiError::conflict("VENDOR_EXISTS", "You already have a vendor profile")
}

/// create_vendor
///
/// Registers the caller's vendor listing. It stays hidden until an admin approves it.
#[utoipa::path(
    post,
    path = "/api/v1/vendors",
    request_body = CreateVendorRequest,
    responses(
        (status = 201, description = "Vendor created", body = VendorResponse),
        (status = 409, description = "Caller already owns a vendor")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_vendor(
    user: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateVendorRequest>,
) -> ApiResult<(StatusCode, Json<VendorResponse>)> {
    user.require_active()?;
    if state.repo.find_vendor_by_user(user.id).await?.is_some() {
        return Err(vendor_exists());
    }

    let clean = CreateVendorRequest {
        company_name: strip_tags(&req.company_name),
        business_name: strip_tags(&req.business_name),
        description: strip_tags(&req.description),
        email: normalize_email(&req.email),
        address: strip_tags_opt(req.address),
        city: strip_tags_opt(req.city),
        state: strip_tags_opt(req.state),
        country: strip_tags_opt(req.country),
        business_type: strip_tags(&req.business_type),
        ..req
    };

    let vendor = state
        .repo
        .create_vendor(user.id, &clean)
        .await
        .map_err(|e| match e {
            RepositoryError::Duplicate(_) => vendor_exists(),
            other => other.into(),
        })?;

    tracing::info!(vendor_id = %vendor.id, user_id = %user.id, "vendor created");
    Ok((
        StatusCode::CREATED,
        Json(VendorResponse {
            message: "Vendor profile created successfully".to_string(),
            vendor,
        }),
    ))
}

/// create_review
///
/// One review per user and vendor. Reviews wait for moderation before they count.
#[utoipa::path(
    post,
    path = "/api/v1/vendors/{id}/reviews",
    params(("id" = Uuid, Path, description = "Vendor ID")),
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Review submitted", body = ReviewResponse),
        (status = 404, description = "Vendor not found or unavailable"),
        (status = 409, description = "Already reviewed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_review(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<CreateReviewRequest>,
) -> ApiResult<(StatusCode, Json<ReviewResponse>)> {
    user.require_active()?;
    let vendor = visible_vendor(&state, id).await?;
    if vendor.user_id == Some(user.id) {
        return Err(ApiError::forbidden(
            "OWN_VENDOR_REVIEW",
            "You cannot review your own vendor",
        ));
    }

    let clean = CreateReviewRequest {
        rating: req.rating,
        title: strip_tags_opt(req.title),
        content: strip_tags(&req.content),
    };
    let review = state
        .repo
        .create_review(id, user.id, &clean)
        .await
        .map_err(|e| match e {
            RepositoryError::Duplicate(_) => {
                ApiError::conflict("REVIEW_EXISTS", "You have already reviewed this vendor")
            }
            other => other.into(),
        })?;

    tracing::info!(review_id = %review.id, vendor_id = %id, "review submitted");
    Ok((
        StatusCode::CREATED,
        Json(ReviewResponse {
            message: "Review submitted for moderation".to_string(),
            review,
        }),
    ))
}

/// contact_vendor
///
/// Forwards an inquiry to the vendor's contact address.
#[utoipa::path(
    post,
    path = "/api/v1/vendors/{id}/contact",
    params(("id" = Uuid, Path, description = "Vendor ID")),
    request_body = VendorContactRequest,
    responses(
        (status = 200, description = "Message forwarded", body = MessageResponse),
        (status = 404, description = "Vendor not found or unavailable"),
        (status = 503, description = "Message could not be delivered")
    )
)]
pub async fn contact_vendor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<VendorContactRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let vendor = visible_vendor(&state, id).await?;
    let email = mailer::vendor_contact_email(
        &vendor.email,
        &vendor.company_name,
        &strip_tags(&req.name),
        &normalize_email(&req.email),
        &strip_tags(&req.message),
    );

    if !deliver(&state.mailer, email).await {
        return Err(ApiError::unavailable(
            "EMAIL_SEND_FAILED",
            "Your message could not be delivered, please try again later",
        ));
    }
    Ok(Json(MessageResponse::new("Your message has been sent to the vendor")))
}
