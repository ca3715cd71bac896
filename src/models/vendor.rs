use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use super::text_enum;
use crate::{
    error::FieldError,
    pagination::PaginationMeta,
    validation::{Validate, Validator},
};

text_enum!(
    VendorStatus {
        PendingApproval => "PENDING_APPROVAL",
        Active => "ACTIVE",
        Suspended => "SUSPENDED",
        Rejected => "REJECTED",
    }
);

text_enum!(
    ReviewStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
    }
);

/// Vendor
///
/// A directory listing. Only `ACTIVE` vendors are visible publicly; `average_rating` and
/// `total_reviews` are derived from approved public reviews.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Vendor {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub company_name: String,
    pub business_name: String,
    pub description: String,
    pub email: String,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub business_type: String,
    pub year_established: Option<i32>,
    pub employee_count: Option<String>,
    pub status: String,
    pub average_rating: f64,
    pub total_reviews: i32,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Compact vendor reference embedded in user payloads.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct VendorSummary {
    pub id: Uuid,
    pub company_name: String,
    pub business_name: String,
    pub status: String,
}

impl From<&Vendor> for VendorSummary {
    fn from(vendor: &Vendor) -> Self {
        Self {
            id: vendor.id,
            company_name: vendor.company_name.clone(),
            business_name: vendor.business_name.clone(),
            status: vendor.status.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct VendorService {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub base_price: Option<f64>,
    pub price_unit: Option<String>,
    pub is_active: bool,
    pub is_featured: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Review {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub user_id: Uuid,
    pub rating: i32,
    pub title: Option<String>,
    pub content: String,
    pub status: String,
    pub is_public: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// A review joined with its author's display name.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReviewView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub review: Review,
    pub author_name: String,
}

/// VendorFilter
///
/// Public listing filters. `minRating` stays a string so junk input is ignored.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct VendorFilter {
    pub query: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub min_rating: Option<String>,
}

/// Resolved vendor search parameters handed to the repository.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VendorSearch {
    pub query: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub min_rating: Option<f64>,
}

impl From<VendorFilter> for VendorSearch {
    fn from(filter: VendorFilter) -> Self {
        let non_empty = |s: Option<String>| s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            query: non_empty(filter.query),
            country: non_empty(filter.country),
            city: non_empty(filter.city),
            min_rating: filter
                .min_rating
                .and_then(|r| r.trim().parse::<f64>().ok())
                .filter(|r| r.is_finite()),
        }
    }
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct LimitQuery {
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct AdminVendorFilter {
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VendorListResponse {
    pub vendors: Vec<Vendor>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PopularVendorsResponse {
    pub vendors: Vec<Vendor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct VendorDetail {
    #[serde(flatten)]
    pub vendor: Vendor,
    pub services: Vec<VendorService>,
    pub reviews: Vec<ReviewView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VendorDetailResponse {
    pub vendor: VendorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VendorResponse {
    pub message: String,
    pub vendor: Vendor,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ReviewListResponse {
    pub reviews: Vec<ReviewView>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ReviewResponse {
    pub message: String,
    pub review: Review,
}

/// CreateVendorRequest
///
/// Vendor self-registration. New listings start as `PENDING_APPROVAL`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateVendorRequest {
    pub company_name: String,
    pub business_name: String,
    pub description: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub business_type: String,
    pub year_established: Option<i32>,
    pub employee_count: Option<String>,
    pub website: Option<String>,
}

impl Validate for CreateVendorRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let current_year = Utc::now().year();
        Validator::new()
            .required("companyName", &self.company_name)
            .required("businessName", &self.business_name)
            .length("description", &self.description, 10, usize::MAX)
            .email("email", &self.email)
            .required("businessType", &self.business_type)
            .range("yearEstablished", self.year_established, 1800, current_year)
            .url("website", self.website.as_deref())
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateReviewRequest {
    pub rating: i32,
    pub title: Option<String>,
    pub content: String,
}

impl Validate for CreateReviewRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new()
            .range("rating", Some(self.rating), 1, 5)
            .max_length("title", self.title.as_deref(), 200)
            .required("content", &self.content)
            .max_length("content", Some(&self.content), 5000)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct VendorContactRequest {
    pub name: String,
    pub email: String,
    pub message: String,
}

impl Validate for VendorContactRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new()
            .required("name", &self.name)
            .email("email", &self.email)
            .length("message", &self.message, 10, 5000)
            .finish()
    }
}
