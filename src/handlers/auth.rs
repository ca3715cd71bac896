use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;

use crate::{
    AppState,
    auth::{
        AuthUser, TokenType, bearer_token, decode_token, generate_one_time_token, hash_password,
        issue_token_pair, open_session, validate_password_strength, verify_password,
    },
    error::{ApiError, ApiResult, RepositoryError},
    handlers::client_info,
    mailer::{self, deliver},
    models::{
        AuthTokens, ForgotPasswordRequest, LoginRequest, LoginResponse, MeResponse,
        MessageResponse, NewUser, PublicUser, RefreshRequest, RefreshResponse, RegisterRequest,
        RegisterResponse, RegisteredUser, ResetPasswordRequest, Role, SessionInfo, UserStatus,
        VerifyEmailRequest,
    },
    sanitize::{mask_email, strip_tags},
    throttle::{ThrottleScope, client_ip},
    validation::{ValidatedJson, normalize_email},
};

const VERIFICATION_TTL_HOURS: i64 = 24;
const RESET_TTL_HOURS: i64 = 1;

/// register
///
/// Creates a `USER` or `VENDOR` account. With email verification on, the account starts
/// `PENDING_VERIFICATION` and a verification link is mailed out.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 400, description = "Invalid input or weak password"),
        (status = 403, description = "Registration disabled"),
        (status = 409, description = "Email already registered"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<ValidatedJson<RegisterRequest>, ApiError>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    if !state.config.features.registration {
        return Err(ApiError::forbidden(
            "REGISTRATION_DISABLED",
            "Registration is currently disabled",
        ));
    }
    state
        .throttle
        .check(ThrottleScope::Register, &client_ip(&headers))?;
    let ValidatedJson(req) = payload?;

    let email = normalize_email(&req.email);
    validate_password_strength(&req.password).map_err(ApiError::WeakPassword)?;

    if state.repo.find_user_by_email(&email).await?.is_some() {
        return Err(user_exists());
    }

    let role = req
        .role
        .as_deref()
        .and_then(Role::parse)
        .unwrap_or(Role::User);
    let password_hash = hash_password(&req.password, state.config.password_hash).await?;

    let verification_required = state.config.features.email_verification;
    let (verification_token, verification_expires) = if verification_required {
        let (token, expires) =
            generate_one_time_token(chrono::Duration::hours(VERIFICATION_TTL_HOURS));
        (Some(token), Some(expires))
    } else {
        (None, None)
    };

    let user = state
        .repo
        .create_user(NewUser {
            email,
            password_hash: Some(password_hash),
            first_name: strip_tags(&req.first_name),
            last_name: strip_tags(&req.last_name),
            avatar_url: None,
            role,
            status: if verification_required {
                UserStatus::PendingVerification
            } else {
                UserStatus::Active
            },
            email_verified: !verification_required,
            verification_token: verification_token.clone(),
            verification_expires,
            google_id: None,
        })
        .await
        .map_err(|e| match e {
            RepositoryError::Duplicate(_) => user_exists(),
            other => other.into(),
        })?;

    if let Some(token) = verification_token {
        deliver(
            &state.mailer,
            mailer::verification_email(&user.email, &token, &state.config),
        )
        .await;
    }

    tracing::info!(user_id = %user.id, email = %mask_email(&user.email), "user registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".to_string(),
            user: RegisteredUser {
                user: PublicUser::from(&user),
                email_verification_required: verification_required,
            },
        }),
    ))
}

fn user_exists() -> ApiError {
    ApiError::conflict("USER_EXISTS", "User with this email already exists")
}

fn invalid_credentials() -> ApiError {
    ApiError::unauthorized("INVALID_CREDENTIALS", "Invalid email or password")
}

/// login
///
/// Password login. Checks run in a fixed order: attempt limit, lockout, password,
/// account status, verification. A wrong password counts towards the lockout.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Email not verified"),
        (status = 423, description = "Account locked, suspended or deleted"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<ValidatedJson<LoginRequest>, ApiError>,
) -> ApiResult<Json<LoginResponse>> {
    state
        .throttle
        .check(ThrottleScope::Login, &client_ip(&headers))?;
    let ValidatedJson(req) = payload?;
    let email = normalize_email(&req.email);
    let now = Utc::now();

    let Some(user) = state.repo.find_user_by_email(&email).await? else {
        tracing::debug!(email = %mask_email(&email), "login for unknown email");
        return Err(invalid_credentials());
    };

    if let Some(until) = user.locked_until.filter(|until| *until > now) {
        let remaining = ((until - now).num_seconds() + 59) / 60;
        return Err(ApiError::locked(
            "ACCOUNT_LOCKED",
            format!("Account is locked. Try again in {remaining} minutes."),
        ));
    }

    let password_ok = match user.password_hash.as_deref() {
        Some(stored) => verify_password(&req.password, stored).await?,
        None => false,
    };
    if !password_ok {
        let lock_until = now
            + chrono::Duration::from_std(state.config.lockout_duration)
                .unwrap_or_else(|_| chrono::Duration::minutes(15));
        let updated = state
            .repo
            .record_failed_login(user.id, state.config.max_login_attempts, lock_until)
            .await?;
        if updated.is_locked(now) {
            tracing::warn!(user_id = %user.id, "account locked after repeated failures");
        }
        return Err(invalid_credentials());
    }

    match user.status() {
        UserStatus::Suspended => {
            return Err(ApiError::locked(
                "ACCOUNT_SUSPENDED",
                "Account is suspended. Please contact support.",
            ));
        }
        UserStatus::Deleted => {
            return Err(ApiError::locked("ACCOUNT_DELETED", "Account has been deleted."));
        }
        UserStatus::PendingVerification if !user.email_verified => {
            return Err(ApiError::forbidden(
                "EMAIL_NOT_VERIFIED",
                "Please verify your email address before logging in.",
            ));
        }
        _ => {}
    }

    state.repo.record_successful_login(user.id, now).await?;
    let (session, tokens) = open_session(
        &state.repo,
        &state.config,
        user.id,
        client_info(&headers, req.device_info),
    )
    .await?;

    let mut public = PublicUser::from(&user);
    public.last_login = Some(now);

    tracing::info!(user_id = %user.id, email = %mask_email(&user.email), "user logged in");

    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        user: public,
        tokens: AuthTokens::from(&tokens),
        session: SessionInfo {
            id: session.id,
            expires_at: session.expires_at,
        },
    }))
}

/// logout
///
/// Revokes the session behind the presented access token, if there is one.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses((status = 200, description = "Logged out", body = MessageResponse))
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<MessageResponse>> {
    if let Some(token) = bearer_token(&headers) {
        if let Some(session) = state.repo.find_session_by_token(token).await? {
            state.repo.delete_session(session.id).await?;
            tracing::info!(user_id = %session.user_id, "user logged out");
        }
    }
    Ok(Json(MessageResponse::new("Logout successful")))
}

/// refresh
///
/// Rotates both tokens of the session that owns the refresh token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens refreshed", body = RefreshResponse),
        (status = 400, description = "Refresh token missing"),
        (status = 401, description = "Invalid refresh token or session")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let refresh_token = req
        .refresh_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("REFRESH_TOKEN_MISSING", "Refresh token required"))?;

    let claims = decode_token(&refresh_token, TokenType::Refresh, &state.config)
        .map_err(|_| ApiError::unauthorized("INVALID_REFRESH_TOKEN", "Invalid refresh token"))?;

    let invalid = || ApiError::unauthorized("SESSION_INVALID", "Invalid or expired session");
    let session = state
        .repo
        .find_session_by_refresh_token(&refresh_token)
        .await?
        .filter(|s| s.user_id == claims.sub && s.refresh_expires_at > Utc::now())
        .ok_or_else(invalid)?;

    let user = state
        .repo
        .find_user_by_id(session.user_id)
        .await?
        .ok_or_else(invalid)?;
    if matches!(user.status(), UserStatus::Suspended | UserStatus::Deleted) {
        state.repo.delete_session(session.id).await?;
        return Err(invalid());
    }

    let tokens = issue_token_pair(user.id, &state.config)?;
    state
        .repo
        .rotate_session(
            session.id,
            &tokens.access_token,
            &tokens.refresh_token,
            tokens.access_expires_at,
            tokens.refresh_expires_at,
        )
        .await?
        .ok_or_else(invalid)?;

    Ok(Json(RefreshResponse {
        message: "Tokens refreshed successfully".to_string(),
        tokens: AuthTokens::from(&tokens),
    }))
}

async fn complete_verification(state: &AppState, token: &str) -> ApiResult<Json<MessageResponse>> {
    let user = state
        .repo
        .find_user_by_verification_token(token)
        .await?
        .filter(|u| !u.email_verified && u.verification_expires.is_some_and(|e| e > Utc::now()))
        .ok_or_else(|| {
            ApiError::bad_request(
                "INVALID_VERIFICATION_TOKEN",
                "Invalid or expired verification token",
            )
        })?;

    state.repo.mark_email_verified(user.id).await?;
    deliver(
        &state.mailer,
        mailer::welcome_email(&user.email, &user.first_name, &state.config),
    )
    .await;

    tracing::info!(user_id = %user.id, "email verified");
    Ok(Json(MessageResponse::new("Email verified successfully")))
}

/// verify_email
///
/// Consumes a verification token and activates the account.
#[utoipa::path(
    post,
    path = "/api/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Invalid or expired token")
    )
)]
pub async fn verify_email(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<VerifyEmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    complete_verification(&state, req.token.trim()).await
}

/// Same as `verify_email`, for the link in the verification mail.
#[utoipa::path(
    get,
    path = "/api/v1/auth/verify-email",
    params(("token" = String, Query, description = "Verification token")),
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Invalid or expired token")
    )
)]
pub async fn verify_email_link(
    State(state): State<AppState>,
    Query(req): Query<VerifyEmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    complete_verification(&state, req.token.trim()).await
}

/// forgot_password
///
/// Answers identically whether or not the email is registered.
#[utoipa::path(
    post,
    path = "/api/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset link sent if the account exists", body = MessageResponse),
        (status = 403, description = "Password reset disabled")
    )
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    payload: Result<ValidatedJson<ForgotPasswordRequest>, ApiError>,
) -> ApiResult<Json<MessageResponse>> {
    if !state.config.features.password_reset {
        return Err(ApiError::forbidden(
            "PASSWORD_RESET_DISABLED",
            "Password reset is currently disabled",
        ));
    }
    let ValidatedJson(req) = payload?;
    let email = normalize_email(&req.email);

    match state.repo.find_user_by_email(&email).await? {
        Some(user) if user.status() != UserStatus::Deleted => {
            let (token, expires) = generate_one_time_token(chrono::Duration::hours(RESET_TTL_HOURS));
            state.repo.set_reset_token(user.id, &token, expires).await?;
            deliver(
                &state.mailer,
                mailer::password_reset_email(&user.email, &token, &state.config),
            )
            .await;
            tracing::info!(user_id = %user.id, "password reset requested");
        }
        _ => tracing::debug!(email = %mask_email(&email), "password reset for unknown email"),
    }

    Ok(Json(MessageResponse::new(
        "If an account with that email exists, we sent a password reset link.",
    )))
}

/// reset_password
///
/// Sets a new password from a reset token and signs the user out everywhere.
#[utoipa::path(
    post,
    path = "/api/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Weak password or invalid token")
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    validate_password_strength(&req.password).map_err(ApiError::WeakPassword)?;

    let user = state
        .repo
        .find_user_by_reset_token(req.token.trim())
        .await?
        .filter(|u| u.reset_expires.is_some_and(|e| e > Utc::now()))
        .ok_or_else(|| {
            ApiError::bad_request("INVALID_RESET_TOKEN", "Invalid or expired reset token")
        })?;

    let password_hash = hash_password(&req.password, state.config.password_hash).await?;
    state.repo.update_password(user.id, &password_hash).await?;
    let revoked = state.repo.delete_user_sessions(user.id).await?;

    tracing::info!(user_id = %user.id, revoked, "password reset");
    Ok(Json(MessageResponse::new("Password reset successfully")))
}

/// me
///
/// The caller's own account.
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<MeResponse>> {
    let user = state
        .repo
        .find_user_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("USER_NOT_FOUND", "User not found"))?;
    Ok(Json(MeResponse {
        user: PublicUser::from(&user),
    }))
}
