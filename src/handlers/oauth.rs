use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
    response::Redirect,
};
use chrono::Utc;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    AppState,
    auth::{generate_one_time_token, open_session},
    error::{ApiError, ApiResult},
    handlers::client_info,
    mailer::{self, deliver},
    models::{
        NewUser, OAuthState, OAuthStatusResponse, ProviderStatus, Role, User, UserStatus,
    },
    oauth::{OAuthProfile, safe_redirect},
    sanitize::mask_email,
    validation::normalize_email,
};

const STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Deserialize, IntoParams)]
pub struct OAuthStartQuery {
    /// Local path to land on after login.
    pub redirect: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// google_start
///
/// Records a one-time state and sends the browser to Google's consent screen.
#[utoipa::path(
    get,
    path = "/api/v1/auth/oauth/google",
    params(OAuthStartQuery),
    responses(
        (status = 303, description = "Redirect to Google"),
        (status = 503, description = "Google OAuth not configured")
    )
)]
pub async fn google_start(
    State(state): State<AppState>,
    Query(query): Query<OAuthStartQuery>,
) -> ApiResult<Redirect> {
    if !state.config.features.oauth || state.config.google.client_id.is_none() {
        return Err(ApiError::unavailable(
            "OAUTH_NOT_CONFIGURED",
            "Google OAuth is not configured",
        ));
    }

    let now = Utc::now();
    let purged = state.repo.purge_expired_oauth_states(now).await?;
    if purged > 0 {
        tracing::debug!(purged, "expired oauth states removed");
    }

    let (token, expires_at) =
        generate_one_time_token(chrono::Duration::minutes(STATE_TTL_MINUTES));
    state
        .repo
        .create_oauth_state(OAuthState {
            state: token.clone(),
            redirect_url: safe_redirect(query.redirect.as_deref()),
            expires_at,
            created_at: now,
        })
        .await?;

    Ok(Redirect::to(&state.google.authorization_url(&token)))
}

/// The reasons a callback bounces back to the login page.
#[derive(Debug)]
enum CallbackFailure {
    Provider(String),
    MissingParams,
    InvalidState,
    TokenExchange,
    UserInfo,
    AccountUnavailable,
    Other,
}

impl CallbackFailure {
    fn code(&self) -> &str {
        match self {
            CallbackFailure::Provider(error) => error.as_str(),
            CallbackFailure::MissingParams => "missing_params",
            CallbackFailure::InvalidState => "invalid_state",
            CallbackFailure::TokenExchange => "token_exchange_failed",
            CallbackFailure::UserInfo => "user_info_failed",
            CallbackFailure::AccountUnavailable => "account_unavailable",
            CallbackFailure::Other => "oauth_failed",
        }
    }
}

impl From<ApiError> for CallbackFailure {
    fn from(err: ApiError) -> Self {
        tracing::error!(error = ?err, "oauth callback failed");
        CallbackFailure::Other
    }
}

impl From<crate::error::RepositoryError> for CallbackFailure {
    fn from(err: crate::error::RepositoryError) -> Self {
        ApiError::from(err).into()
    }
}

/// google_callback
///
/// Always answers with a redirect: to the stored destination carrying fresh tokens, or to
/// the login page with an `error` code.
#[utoipa::path(
    get,
    path = "/api/v1/auth/oauth/google/callback",
    params(OAuthCallbackQuery),
    responses((status = 303, description = "Redirect to the frontend"))
)]
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<OAuthCallbackQuery>,
) -> Redirect {
    match finish_google_login(&state, &headers, query).await {
        Ok(location) => Redirect::to(&location),
        Err(failure) => {
            tracing::warn!(reason = failure.code(), "oauth login rejected");
            Redirect::to(&format!(
                "{}/login?error={}",
                state.config.frontend_url,
                urlencoding::encode(failure.code())
            ))
        }
    }
}

async fn finish_google_login(
    state: &AppState,
    headers: &HeaderMap,
    query: OAuthCallbackQuery,
) -> Result<String, CallbackFailure> {
    if let Some(error) = query.error.filter(|e| !e.is_empty()) {
        return Err(CallbackFailure::Provider(error));
    }
    let (Some(code), Some(state_token)) = (query.code, query.state) else {
        return Err(CallbackFailure::MissingParams);
    };

    let stored = state
        .repo
        .take_oauth_state(&state_token)
        .await?
        .filter(|s| s.expires_at > Utc::now())
        .ok_or(CallbackFailure::InvalidState)?;

    let access_token = state.google.exchange_code(&code).await.map_err(|e| {
        tracing::error!(error = %e, "google token exchange failed");
        CallbackFailure::TokenExchange
    })?;
    let profile = state.google.fetch_profile(&access_token).await.map_err(|e| {
        tracing::error!(error = %e, "google user info failed");
        CallbackFailure::UserInfo
    })?;

    let user = resolve_google_user(state, profile).await?;
    if matches!(user.status(), UserStatus::Suspended | UserStatus::Deleted) {
        return Err(CallbackFailure::AccountUnavailable);
    }

    state.repo.record_successful_login(user.id, Utc::now()).await?;
    let (_, tokens) = open_session(
        &state.repo,
        &state.config,
        user.id,
        client_info(headers, Some("Google OAuth".to_string())),
    )
    .await?;

    tracing::info!(user_id = %user.id, "google login");

    let separator = if stored.redirect_url.contains('?') { '&' } else { '?' };
    Ok(format!(
        "{}{}{separator}token={}&refresh={}",
        state.config.frontend_url,
        stored.redirect_url,
        urlencoding::encode(&tokens.access_token),
        urlencoding::encode(&tokens.refresh_token)
    ))
}

/// Finds the account for a Google identity, linking or creating one as needed.
async fn resolve_google_user(state: &AppState, profile: OAuthProfile) -> Result<User, CallbackFailure> {
    if let Some(user) = state.repo.find_user_by_google_id(&profile.id).await? {
        return Ok(user);
    }

    let email = normalize_email(&profile.email);
    if let Some(existing) = state.repo.find_user_by_email(&email).await? {
        if existing.google_id.is_some() {
            // The address belongs to a different Google account.
            return Err(CallbackFailure::AccountUnavailable);
        }
        let linked = state
            .repo
            .link_google_account(existing.id, &profile.id, profile.avatar_url.as_deref())
            .await?;
        tracing::info!(user_id = %linked.id, "google account linked");
        return Ok(linked);
    }

    let user = state
        .repo
        .create_user(NewUser {
            email,
            password_hash: None,
            first_name: profile
                .first_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "User".to_string()),
            last_name: profile.last_name.unwrap_or_default(),
            avatar_url: profile.avatar_url,
            role: Role::User,
            status: UserStatus::Active,
            email_verified: true,
            verification_token: None,
            verification_expires: None,
            google_id: Some(profile.id),
        })
        .await?;

    deliver(
        &state.mailer,
        mailer::welcome_email(&user.email, &user.first_name, &state.config),
    )
    .await;
    tracing::info!(user_id = %user.id, email = %mask_email(&user.email), "user created via google");
    Ok(user)
}

/// oauth_status
///
/// Which providers the frontend may offer.
#[utoipa::path(
    get,
    path = "/api/v1/auth/oauth/status",
    responses((status = 200, description = "Provider availability", body = OAuthStatusResponse))
)]
pub async fn oauth_status(State(state): State<AppState>) -> Json<OAuthStatusResponse> {
    let enabled = state.config.features.oauth;
    let status = |client: &crate::config::OAuthClientConfig| ProviderStatus {
        enabled: enabled && client.client_id.is_some(),
        configured: enabled && client.is_configured(),
    };
    Json(OAuthStatusResponse {
        google: status(&state.config.google),
        microsoft: status(&state.config.microsoft),
    })
}
