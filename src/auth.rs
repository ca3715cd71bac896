use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, PasswordHashParams},
    error::{ApiError, ApiResult},
    models::{AuthTokens, NewSession, Role, Session, User, UserStatus},
    repository::RepositoryState,
};

pub const TOKEN_ISSUER: &str = "meyden-api";
pub const TOKEN_AUDIENCE: &str = "meyden-client";

/// Which half of a token pair a JWT is. A refresh token is never accepted as an access
/// token and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims
///
/// The payload signed into every JWT this service issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user id.
    pub sub: Uuid,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
    pub iss: String,
    pub aud: String,
    pub typ: TokenType,
    /// Unique per token so two pairs minted in the same second never collide.
    pub jti: Uuid,
}

/// A freshly minted access/refresh pair and the instants they stop working.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

impl From<&TokenPair> for AuthTokens {
    fn from(pair: &TokenPair) -> Self {
        Self {
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
            expires_in: pair.expires_in,
        }
    }
}

fn sign(user_id: Uuid, typ: TokenType, ttl: std::time::Duration, config: &AppConfig)
-> ApiResult<(String, DateTime<Utc>)> {
    let now = Utc::now();
    let expires_at = now
        + chrono::Duration::from_std(ttl).map_err(|e| ApiError::internal(e.to_string()))?;
    let claims = Claims {
        sub: user_id,
        exp: expires_at.timestamp() as usize,
        iat: now.timestamp() as usize,
        iss: TOKEN_ISSUER.to_string(),
        aud: TOKEN_AUDIENCE.to_string(),
        typ,
        jti: Uuid::new_v4(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::internal(format!("token signing failed: {e}")))?;
    Ok((token, expires_at))
}

/// issue_token_pair
///
/// Signs an HS256 access token and a longer-lived refresh token for the user.
pub fn issue_token_pair(user_id: Uuid, config: &AppConfig) -> ApiResult<TokenPair> {
    let (access_token, access_expires_at) =
        sign(user_id, TokenType::Access, config.access_token_ttl, config)?;
    let (refresh_token, refresh_expires_at) =
        sign(user_id, TokenType::Refresh, config.refresh_token_ttl, config)?;
    Ok(TokenPair {
        access_token,
        refresh_token,
        access_expires_at,
        refresh_expires_at,
        expires_in: config.access_token_ttl.as_secs() as i64,
    })
}

/// decode_token
///
/// Verifies signature, algorithm, issuer, audience and expiry, then checks the token is
/// of the expected type.
pub fn decode_token(token: &str, expected: TokenType, config: &AppConfig) -> ApiResult<Claims> {
    let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.set_issuer(&[TOKEN_ISSUER]);
    validation.set_audience(&[TOKEN_AUDIENCE]);
    validation.validate_exp = true;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )?;
    if data.claims.typ != expected {
        return Err(ApiError::unauthorized("TOKEN_INVALID", "Invalid token type"));
    }
    Ok(data.claims)
}

fn hasher(params: PasswordHashParams) -> ApiResult<Argon2<'static>> {
    let params = Params::new(params.memory_kib, params.iterations, 1, None)
        .map_err(|e| ApiError::internal(format!("invalid argon2 params: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// hash_password
///
/// Argon2id PHC string. Runs on the blocking pool; hashing is deliberately slow.
pub async fn hash_password(password: &str, params: PasswordHashParams) -> ApiResult<String> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
            .map_err(|e| ApiError::internal(format!("salt encoding failed: {e}")))?;
        hasher(params)?
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::internal(format!("password hashing failed: {e}")))
    })
    .await
    .map_err(|e| ApiError::internal(format!("hashing task failed: {e}")))?
}

/// verify_password
///
/// Cost parameters come from the stored hash, so hashes made under older settings
/// still verify. A malformed stored hash counts as a mismatch.
pub async fn verify_password(password: &str, stored_hash: &str) -> ApiResult<bool> {
    let password = password.to_owned();
    let stored_hash = stored_hash.to_owned();
    tokio::task::spawn_blocking(move || match PasswordHash::new(&stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash is malformed");
            false
        }
    })
    .await
    .map_err(|e| ApiError::internal(format!("verification task failed: {e}")))
}

/// validate_password_strength
///
/// Reports every rule the password breaks, not just the first.
pub fn validate_password_strength(password: &str) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    if password.chars().count() < 8 {
        errors.push("Password must be at least 8 characters long".to_string());
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        errors.push("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        errors.push("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one number".to_string());
    }
    if !password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace()) {
        errors.push("Password must contain at least one special character".to_string());
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Random single-use token (email verification, password reset, OAuth state) and its expiry.
pub fn generate_one_time_token(ttl: chrono::Duration) -> (String, DateTime<Utc>) {
    let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    (token, Utc::now() + ttl)
}

/// Pulls the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Client metadata recorded on a new session.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// open_session
///
/// Issues a token pair for the user and persists the session that owns it.
pub async fn open_session(
    repo: &RepositoryState,
    config: &AppConfig,
    user_id: Uuid,
    client: ClientInfo,
) -> ApiResult<(Session, TokenPair)> {
    let tokens = issue_token_pair(user_id, config)?;
    let session = repo
        .create_session(NewSession {
            user_id,
            token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            device_info: client.device_info,
            ip_address: client.ip_address,
            user_agent: client.user_agent,
            expires_at: tokens.access_expires_at,
            refresh_expires_at: tokens.refresh_expires_at,
        })
        .await?;
    Ok((session, tokens))
}

/// AuthUser
///
/// The resolved identity of an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub status: UserStatus,
    /// The session that owns the presented access token.
    pub session_id: Uuid,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Write operations require an `ACTIVE` account.
    pub fn require_active(&self) -> ApiResult<()> {
        if self.status == UserStatus::Active {
            Ok(())
        } else {
            Err(ApiError::forbidden(
                "ACCOUNT_INACTIVE",
                "Account must be active to perform this action",
            ))
        }
    }

    fn from_user(user: &User, session_id: Uuid) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role(),
            status: user.status(),
            session_id,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Token Extraction: `Authorization: Bearer <token>`.
/// 2. JWT Decoding: signature, claims and token type.
/// 3. Session Lookup: the exact token must belong to a live session of the same user.
/// 4. DB Lookup: the user's current role and status.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        // 1. Token Extraction
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("TOKEN_MISSING", "Access token required"))?;

        // 2. JWT Decoding
        // Expired, malformed and wrong-type tokens all answer the same way.
        let claims = decode_token(token, TokenType::Access, &config).map_err(|_| {
            ApiError::unauthorized("TOKEN_INVALID", "Invalid or expired access token")
        })?;

        // 3. Session Lookup
        let invalid = || ApiError::unauthorized("SESSION_INVALID", "Session expired or revoked");
        let session = repo
            .find_session_by_token(token)
            .await?
            .filter(|s| s.user_id == claims.sub && s.expires_at > Utc::now())
            .ok_or_else(invalid)?;

        // 4. DB Lookup
        let user = repo.find_user_by_id(claims.sub).await?.ok_or_else(invalid)?;

        Ok(AuthUser::from_user(&user, session.id))
    }
}

/// AdminUser
///
/// An `AuthUser` whose role passes admin checks.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            tracing::warn!(user_id = %user.id, "admin route denied");
            return Err(ApiError::forbidden(
                "INSUFFICIENT_PERMISSIONS",
                "Admin access required",
            ));
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_strength_reports_every_rule() {
        assert!(validate_password_strength("Str0ng!pass").is_ok());
        let errors = validate_password_strength("abc").unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("8 characters")));
        assert!(errors.iter().any(|e| e.contains("special")));
    }

    #[test]
    fn token_types_are_not_interchangeable() {
        let config = AppConfig::default();
        let pair = issue_token_pair(Uuid::new_v4(), &config).unwrap();
        assert!(decode_token(&pair.access_token, TokenType::Access, &config).is_ok());
        assert!(decode_token(&pair.refresh_token, TokenType::Refresh, &config).is_ok());
        let err = decode_token(&pair.refresh_token, TokenType::Access, &config).unwrap_err();
        assert_eq!(err.code(), "TOKEN_INVALID");
        assert!(pair.refresh_expires_at > pair.access_expires_at);
        assert_ne!(pair.access_token, pair.refresh_token);
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let config = AppConfig::default();
        let pair = issue_token_pair(Uuid::new_v4(), &config).unwrap();
        let other = AppConfig {
            jwt_secret: "a-completely-different-secret-value".into(),
            ..AppConfig::default()
        };
        let err = decode_token(&pair.access_token, TokenType::Access, &other).unwrap_err();
        assert_eq!(err.code(), "TOKEN_INVALID");
    }

    #[tokio::test]
    async fn hash_round_trip() {
        let params = AppConfig::default().password_hash;
        let hash = hash_password("Str0ng!pass", params).await.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("Str0ng!pass", &hash).await.unwrap());
        assert!(!verify_password("wrong", &hash).await.unwrap());
        assert!(!verify_password("Str0ng!pass", "not-a-hash").await.unwrap());
    }

    #[test]
    fn bearer_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }
}
