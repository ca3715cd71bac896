mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use common::{PASSWORD, error_code, spawn_app, spawn_app_with_config, test_config};
use jsonwebtoken::{EncodingKey, Header, encode};
use meyden_api::{
    AppConfig,
    auth::{Claims, TOKEN_AUDIENCE, TOKEN_ISSUER, TokenType},
    config::{FeatureFlags, RateLimit},
    models::{NewUser, Role, UserStatus},
    repository::Repository,
};
use serde_json::json;
use std::time::Duration;
use tower::util::ServiceExt;
use uuid::Uuid;

/// Pulls the `token` query parameter out of the plain-text part of a captured email.
fn token_from_link(text: &str) -> String {
    let start = text.find("token=").expect("link carries a token") + "token=".len();
    text[start..]
        .split(|c: char| c.is_whitespace())
        .next()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn register_login_me_roundtrip() {
    let app = spawn_app();

    let (status, body) = app.register("  Jane.Doe@Example.COM ").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["email"], "jane.doe@example.com");
    assert_eq!(body["user"]["role"], "USER");
    assert_eq!(body["user"]["status"], "ACTIVE");
    assert_eq!(body["user"]["emailVerificationRequired"], false);
    assert!(body["user"].get("passwordHash").is_none());

    let (status, body) = app.login("jane.doe@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    let token = body["tokens"]["accessToken"].as_str().unwrap();
    assert_eq!(body["tokens"]["expiresIn"], 900);

    let (status, me) = app.get("/api/v1/auth/me", Some(token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user"]["email"], "jane.doe@example.com");
    assert!(me["user"]["lastLogin"].is_string());
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let app = spawn_app();
    app.register("dup@example.com").await;
    let (status, body) = app.register("DUP@example.com").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "USER_EXISTS");
}

#[tokio::test]
async fn weak_password_lists_every_failed_rule() {
    let app = spawn_app();
    let (status, body) = app
        .post(
            "/api/v1/auth/register",
            None,
            json!({
                "email": "weak@example.com",
                "password": "abc",
                "firstName": "Weak",
                "lastName": "Password",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "WEAK_PASSWORD");
    assert!(body["errors"].as_array().unwrap().len() >= 3);
}

#[tokio::test]
async fn invalid_registration_reports_fields() {
    let app = spawn_app();
    let (status, body) = app
        .post(
            "/api/v1/auth/register",
            None,
            json!({
                "email": "not-an-email",
                "password": PASSWORD,
                "firstName": "",
                "lastName": "User",
                "role": "ADMIN",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "VALIDATION_ERROR");
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"email"));
    assert!(fields.contains(&"firstName"));
    assert!(fields.contains(&"role"));
}

#[tokio::test]
async fn registration_can_be_disabled() {
    let app = spawn_app_with_config(AppConfig {
        features: FeatureFlags {
            registration: false,
            ..FeatureFlags::default()
        },
        ..test_config()
    });
    let (status, body) = app.register("closed@example.com").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "REGISTRATION_DISABLED");
}

#[tokio::test]
async fn wrong_password_and_unknown_email_look_the_same() {
    let app = spawn_app();
    app.register("known@example.com").await;

    let (s1, b1) = app.login("known@example.com", "Wr0ng!pass").await;
    let (s2, b2) = app.login("nobody@example.com", PASSWORD).await;
    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!(s2, StatusCode::UNAUTHORIZED);
    assert_eq!(b1["error"], b2["error"]);
    assert_eq!(error_code(&b1), "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn repeated_failures_lock_the_account() {
    let app = spawn_app();
    app.register("locked@example.com").await;

    for _ in 0..5 {
        let (status, _) = app.login("locked@example.com", "Wr0ng!pass").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // Even the right password is refused while the lock holds.
    let (status, body) = app.login("locked@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(error_code(&body), "ACCOUNT_LOCKED");
    assert!(body["error"].as_str().unwrap().contains("15 minutes"));
}

#[tokio::test]
async fn login_attempts_are_throttled_per_client() {
    let app = spawn_app_with_config(AppConfig {
        login_limit: RateLimit {
            max_attempts: 2,
            window: Duration::from_secs(900),
        },
        ..test_config()
    });

    app.login("a@example.com", PASSWORD).await;
    app.login("a@example.com", PASSWORD).await;
    let (status, body) = app.login("a@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(error_code(&body), "RATE_LIMITED");
    assert!(body["retryAfter"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn suspended_account_cannot_login() {
    let app = spawn_app();
    let (_, body) = app.register("suspended@example.com").await;
    let id = body["user"]["id"].as_str().unwrap().parse().unwrap();
    app.repo.set_user_status(id, "SUSPENDED").await.unwrap();

    let (status, body) = app.login("suspended@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(error_code(&body), "ACCOUNT_SUSPENDED");
}

#[tokio::test]
async fn email_verification_flow() {
    let app = spawn_app_with_config(AppConfig {
        features: FeatureFlags {
            email_verification: true,
            ..FeatureFlags::default()
        },
        ..test_config()
    });

    let (status, body) = app.register("verify@example.com").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["status"], "PENDING_VERIFICATION");
    assert_eq!(body["user"]["emailVerificationRequired"], true);

    let (status, body) = app.login("verify@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "EMAIL_NOT_VERIFIED");

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "verify@example.com");
    let token = token_from_link(&sent[0].text);

    let (status, _) = app
        .get(&format!("/api/v1/auth/verify-email?token={token}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    // Tokens are single use.
    let (status, body) = app
        .post("/api/v1/auth/verify-email", None, json!({ "token": token }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_VERIFICATION_TOKEN");

    let (status, body) = app.login("verify@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["status"], "ACTIVE");
    assert!(app.mailer.sent().iter().any(|m| m.subject.contains("Welcome")));
}

#[tokio::test]
async fn refresh_rotates_tokens_and_logout_revokes() {
    let app = spawn_app();
    app.register("rotate@example.com").await;
    let (_, body) = app.login("rotate@example.com", PASSWORD).await;
    let access = body["tokens"]["accessToken"].as_str().unwrap().to_string();
    let refresh = body["tokens"]["refreshToken"].as_str().unwrap().to_string();

    let (status, body) = app
        .post("/api/v1/auth/refresh", None, json!({ "refreshToken": refresh }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let new_access = body["tokens"]["accessToken"].as_str().unwrap().to_string();

    // The rotated-out pair no longer matches the session.
    let (status, _) = app
        .post("/api/v1/auth/refresh", None, json!({ "refreshToken": refresh }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = app.get("/api/v1/auth/me", Some(&access)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "SESSION_INVALID");

    let (status, _) = app.post("/api/v1/auth/logout", Some(&new_access), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get("/api/v1/auth/me", Some(&new_access)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Logging out again is harmless.
    let (status, _) = app.post("/api/v1/auth/logout", Some(&new_access), json!({})).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_requires_a_token() {
    let app = spawn_app();
    let (status, body) = app.post("/api/v1/auth/refresh", None, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "REFRESH_TOKEN_MISSING");

    let (status, body) = app
        .post("/api/v1/auth/refresh", None, json!({ "refreshToken": "garbage" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "INVALID_REFRESH_TOKEN");
}

#[tokio::test]
async fn password_reset_flow_signs_out_everywhere() {
    let app = spawn_app();
    let (_, token) = app.signed_in_user("reset@example.com").await;

    let (status, body) = app
        .post(
            "/api/v1/auth/forgot-password",
            None,
            json!({ "email": "reset@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let generic = body["message"].clone();

    // Unknown addresses get the same answer and no mail.
    let (status, body) = app
        .post(
            "/api/v1/auth/forgot-password",
            None,
            json!({ "email": "ghost@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], generic);
    assert_eq!(app.mailer.sent().len(), 1);

    let reset_token = token_from_link(&app.mailer.sent()[0].text);
    let new_password = "N3w!Password";
    let (status, _) = app
        .post(
            "/api/v1/auth/reset-password",
            None,
            json!({ "token": reset_token, "password": new_password }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get("/api/v1/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.login("reset@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.login("reset@example.com", new_password).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(
            "/api/v1/auth/reset-password",
            None,
            json!({ "token": reset_token, "password": "An0ther!Password" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_RESET_TOKEN");
}

#[tokio::test]
async fn protected_routes_need_a_bearer_token() {
    let app = spawn_app();
    let (status, body) = app.get("/api/v1/users/profile", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "TOKEN_MISSING");

    let (status, body) = app.get("/api/v1/users/profile", Some("not.a.jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "TOKEN_INVALID");
}

#[tokio::test]
async fn expired_access_token_is_invalid() {
    let app = spawn_app();
    let (user_id, _) = app.signed_in_user("expired@example.com").await;

    let issued = Utc::now() - chrono::Duration::hours(2);
    let claims = Claims {
        sub: user_id,
        exp: (issued + chrono::Duration::hours(1)).timestamp() as usize,
        iat: issued.timestamp() as usize,
        iss: TOKEN_ISSUER.to_string(),
        aud: TOKEN_AUDIENCE.to_string(),
        typ: TokenType::Access,
        jti: Uuid::new_v4(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(app.config.jwt_secret.as_bytes()),
    )
    .unwrap();

    let (status, body) = app.get("/api/v1/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "TOKEN_INVALID");
}

#[tokio::test]
async fn registrations_are_throttled_per_client() {
    let app = spawn_app_with_config(AppConfig {
        register_limit: RateLimit {
            max_attempts: 2,
            window: Duration::from_secs(60 * 60),
        },
        ..test_config()
    });

    let (status, _) = app.register("first@example.com").await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app.register("second@example.com").await;
    assert_eq!(status, StatusCode::CREATED);

    let payload = json!({
        "email": "third@example.com",
        "password": PASSWORD,
        "firstName": "Third",
        "lastName": "User",
    });
    let response = app
        .router
        .clone()
        .oneshot(
            Request::post("/api/v1/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 60 * 60);
    assert!(app.repo.find_user_by_email("third@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn expired_verification_token_is_rejected() {
    let app = spawn_app();
    app.repo
        .create_user(NewUser {
            email: "late@example.com".to_string(),
            password_hash: None,
            first_name: "Late".to_string(),
            last_name: "User".to_string(),
            avatar_url: None,
            role: Role::User,
            status: UserStatus::PendingVerification,
            email_verified: false,
            verification_token: Some("stale-verification".to_string()),
            verification_expires: Some(Utc::now() - chrono::Duration::minutes(1)),
            google_id: None,
        })
        .await
        .unwrap();

    let (status, body) = app
        .post(
            "/api/v1/auth/verify-email",
            None,
            json!({ "token": "stale-verification" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_VERIFICATION_TOKEN");

    let user = app.repo.find_user_by_email("late@example.com").await.unwrap().unwrap();
    assert!(!user.email_verified);
}

#[tokio::test]
async fn expired_reset_token_is_rejected() {
    let app = spawn_app();
    let (user_id, _) = app.signed_in_user("slow@example.com").await;
    app.repo
        .set_reset_token(
            user_id,
            "stale-reset",
            Utc::now() - chrono::Duration::minutes(1),
        )
        .await
        .unwrap();

    let (status, body) = app
        .post(
            "/api/v1/auth/reset-password",
            None,
            json!({ "token": "stale-reset", "password": "An0ther!Password" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_RESET_TOKEN");

    // The old password still works.
    let (status, _) = app.login("slow@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
}
