use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{VendorSummary, text_enum};
use crate::{
    error::FieldError,
    pagination::PaginationMeta,
    validation::{Validate, Validator},
};

text_enum!(
    /// Role
    ///
    /// RBAC role. `ADMIN` and `SUPER_ADMIN` both pass admin checks.
    Role {
        User => "USER",
        Vendor => "VENDOR",
        Admin => "ADMIN",
        SuperAdmin => "SUPER_ADMIN",
    }
);

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

text_enum!(
    UserStatus {
        Active => "ACTIVE",
        PendingVerification => "PENDING_VERIFICATION",
        Suspended => "SUSPENDED",
        Deleted => "DELETED",
    }
);

/// User
///
/// The full `users` row, credentials included. Never serialized; handlers respond with
/// `PublicUser`.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    // None for accounts created through OAuth.
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
    pub role: String,
    pub status: String,
    pub email_verified: bool,
    pub verification_token: Option<String>,
    pub verification_expires: Option<DateTime<Utc>>,
    pub reset_token: Option<String>,
    pub reset_expires: Option<DateTime<Utc>>,
    pub google_id: Option<String>,
    // Consecutive failed password checks since the last successful login.
    pub login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> Role {
        Role::parse(&self.role).unwrap_or(Role::User)
    }

    pub fn status(&self) -> UserStatus {
        UserStatus::parse(&self.status).unwrap_or(UserStatus::Suspended)
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// Insert payload for a new user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub email_verified: bool,
    pub verification_token: Option<String>,
    pub verification_expires: Option<DateTime<Utc>>,
    pub google_id: Option<String>,
}

/// PublicUser
///
/// The user as exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
    pub role: String,
    pub status: String,
    pub email_verified: bool,
    #[ts(type = "string | null")]
    pub last_login: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            avatar_url: user.avatar_url.clone(),
            role: user.role.clone(),
            status: user.status.clone(),
            email_verified: user.email_verified,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

/// Profile
///
/// Optional per-user profile (`profiles` table, keyed by user id).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Profile {
    pub user_id: Uuid,
    pub bio: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub industry: Option<String>,
    pub experience_years: Option<i32>,
    pub website: Option<String>,
    pub linkedin: Option<String>,
    pub timezone: Option<String>,
    pub language: Option<String>,
    pub email_notifications: bool,
    #[ts(type = "string | null")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// UserDetail
///
/// A user with their profile and vendor listing (if any).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: PublicUser,
    pub profile: Option<Profile>,
    pub vendor: Option<VendorSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserDetailResponse {
    pub user: UserDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserListResponse {
    pub users: Vec<PublicUser>,
    pub pagination: PaginationMeta,
}

/// Query filters for the admin user listing.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct UserFilter {
    pub role: Option<String>,
    pub status: Option<String>,
}

/// Result of an admin status or role change.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserUpdatedResponse {
    pub message: String,
    pub user: PublicUser,
}

// --- Auth payloads ---

/// RegisterRequest
///
/// `role` defaults to `USER`; only `USER` and `VENDOR` may self-register.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub role: Option<String>,
}

pub const SELF_REGISTER_ROLES: &[&str] = &["USER", "VENDOR"];

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new()
            .email("email", &self.email)
            .required("password", &self.password)
            .required("firstName", &self.first_name)
            .required("lastName", &self.last_name)
            .max_length("firstName", Some(&self.first_name), 100)
            .max_length("lastName", Some(&self.last_name), 100)
            .one_of("role", self.role.as_deref(), SELF_REGISTER_ROLES)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub device_info: Option<String>,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new()
            .email("email", &self.email)
            .required("password", &self.password)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl Validate for RefreshRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VerifyEmailRequest {
    pub token: String,
}

impl Validate for VerifyEmailRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new().required("token", &self.token).finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

impl Validate for ForgotPasswordRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new().email("email", &self.email).finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

impl Validate for ResetPasswordRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new()
            .required("token", &self.token)
            .required("password", &self.password)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SessionInfo {
    pub id: Uuid,
    #[ts(type = "string")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub message: String,
    pub user: PublicUser,
    pub tokens: AuthTokens,
    pub session: SessionInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RegisteredUser {
    #[serde(flatten)]
    pub user: PublicUser,
    pub email_verification_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterResponse {
    pub message: String,
    pub user: RegisteredUser,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RefreshResponse {
    pub message: String,
    pub tokens: AuthTokens,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MeResponse {
    pub user: PublicUser,
}

// --- Profile payloads ---

/// UpdateProfileRequest
///
/// Partial update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub industry: Option<String>,
    pub experience_years: Option<i32>,
    pub website: Option<String>,
    pub linkedin: Option<String>,
    pub timezone: Option<String>,
    pub language: Option<String>,
    pub email_notifications: Option<bool>,
}

impl Validate for UpdateProfileRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut v = Validator::new();
        if let Some(first) = &self.first_name {
            v.required("firstName", first);
        }
        if let Some(last) = &self.last_name {
            v.required("lastName", last);
        }
        v.max_length("bio", self.bio.as_deref(), 500)
            .range("experienceYears", self.experience_years, 0, 50)
            .url("website", self.website.as_deref())
            .url("linkedin", self.linkedin.as_deref())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateProfileResponse {
    pub message: String,
    pub profile: Profile,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(role: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            email: "jane@example.com".into(),
            password: "Str0ng!pass".into(),
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            role: role.map(String::from),
        }
    }

    #[test]
    fn admin_self_registration_is_rejected() {
        assert!(register(None).validate().is_ok());
        assert!(register(Some("VENDOR")).validate().is_ok());
        let errors = register(Some("ADMIN")).validate().unwrap_err();
        assert_eq!(errors[0].field, "role");
    }

    #[test]
    fn profile_bounds() {
        let req = UpdateProfileRequest {
            bio: Some("x".repeat(501)),
            experience_years: Some(51),
            website: Some("nope".into()),
            first_name: Some("".into()),
            ..Default::default()
        };
        let fields: Vec<String> = req
            .validate()
            .unwrap_err()
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(fields, vec!["firstName", "bio", "experienceYears", "website"]);
    }

    #[test]
    fn role_helpers() {
        assert!(Role::SuperAdmin.is_admin());
        assert!(!Role::Vendor.is_admin());
        assert_eq!(Role::parse("VENDOR"), Some(Role::Vendor));
        assert_eq!(Role::parse("vendor"), None);
    }
}
