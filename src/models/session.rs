use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Session
///
/// One login. Holds the exact access and refresh tokens issued for it, so revoking the
/// row revokes both tokens even while their signatures are still valid.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub refresh_token: String,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    // Access token validity.
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub token: String,
    pub refresh_token: String,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// OAuthState
///
/// CSRF state for an in-flight OAuth authorization, consumed exactly once by the callback.
#[derive(Debug, Clone, FromRow)]
pub struct OAuthState {
    pub state: String,
    pub redirect_url: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
