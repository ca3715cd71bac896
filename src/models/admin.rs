use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    error::FieldError,
    validation::{Validate, Validator},
};

/// A `GROUP BY status` bucket.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[ts(export)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StatusBreakdown {
    pub total: i64,
    pub by_status: Vec<StatusCount>,
}

impl From<Vec<StatusCount>> for StatusBreakdown {
    fn from(by_status: Vec<StatusCount>) -> Self {
        Self {
            total: by_status.iter().map(|s| s.count).sum(),
            by_status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SurveyStats {
    pub total_responses: i64,
    /// Mean percentage over every response, 0 when there are none.
    pub average_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CommunityStats {
    pub total_posts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct Analytics {
    pub users: StatusBreakdown,
    pub vendors: StatusBreakdown,
    pub surveys: SurveyStats,
    pub community: CommunityStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AnalyticsResponse {
    pub analytics: Analytics,
}

/// PlatformSetting
///
/// Key/value configuration editable by admins. Public settings are readable anonymously.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PlatformSetting {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    pub is_public: bool,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SettingsResponse {
    pub settings: Vec<PlatformSetting>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SettingResponse {
    pub message: String,
    pub setting: PlatformSetting,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateSettingRequest {
    pub value: String,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

impl Validate for UpdateSettingRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new()
            .max_length("value", Some(&self.value), 10_000)
            .max_length("description", self.description.as_deref(), 500)
            .finish()
    }
}

/// Body for every `PUT .../status` moderation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateStatusRequest {
    pub status: String,
}

impl Validate for UpdateStatusRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new().required("status", &self.status).finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateRoleRequest {
    pub role: String,
}

impl Validate for UpdateRoleRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new().required("role", &self.role).finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
    pub environment: String,
    pub database: String,
}

/// Endpoint map served at `/`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct EndpointIndex {
    pub auth: String,
    pub users: String,
    pub vendors: String,
    pub community: Option<String>,
    pub ai_readiness: Option<String>,
    pub admin: String,
    pub upload: String,
    pub settings: String,
    pub health: String,
    pub csrf_token: String,
    pub docs: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct IndexResponse {
    pub message: String,
    pub version: String,
    pub environment: String,
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
    pub endpoints: EndpointIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct ProviderStatus {
    pub enabled: bool,
    pub configured: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct OAuthStatusResponse {
    pub google: ProviderStatus,
    pub microsoft: ProviderStatus,
}
