mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{
    GOOGLE_CODE, TestApp, error_code, google_profile, spawn_app, spawn_app_full,
    spawn_app_with_config, test_config,
};
use chrono::{Duration, Utc};
use meyden_api::{
    AppConfig, MemoryMailer, MockStorageService, StaticOAuthProvider, config::OAuthClientConfig,
    models::OAuthState, repository::Repository,
};
use tower::util::ServiceExt;

fn oauth_config() -> AppConfig {
    let defaults = test_config();
    AppConfig {
        google: OAuthClientConfig {
            client_id: Some("client-id".to_string()),
            client_secret: Some("client-secret".to_string()),
            ..defaults.google.clone()
        },
        ..defaults
    }
}

/// Sends a GET and returns the status with the `Location` header.
async fn follow(app: &TestApp, uri: &str) -> (StatusCode, String) {
    let response = app
        .router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let location = response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    (response.status(), location)
}

fn query_param(url: &str, name: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| urlencoding::decode(value).unwrap().into_owned())
}

/// Runs the consent redirect and returns the state handed to the provider.
async fn start(app: &TestApp, redirect: &str) -> String {
    let (status, location) =
        follow(app, &format!("/api/v1/auth/oauth/google?redirect={redirect}")).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    query_param(&location, "state").expect("state in authorization url")
}

#[tokio::test]
async fn start_requires_configuration() {
    let app = spawn_app();
    let (status, body) = app.get("/api/v1/auth/oauth/google", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_code(&body), "OAUTH_NOT_CONFIGURED");
}

#[tokio::test]
async fn status_reports_configured_providers() {
    let app = spawn_app_with_config(oauth_config());
    let (status, body) = app.get("/api/v1/auth/oauth/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["google"]["configured"], true);
    assert_eq!(body["microsoft"]["configured"], false);
}

#[tokio::test]
async fn callback_creates_account_and_hands_over_tokens() {
    let app = spawn_app_with_config(oauth_config());
    let state = start(&app, "/dashboard").await;

    let (status, location) = follow(
        &app,
        &format!("/api/v1/auth/oauth/google/callback?code={GOOGLE_CODE}&state={state}"),
    )
    .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert!(location.starts_with("http://localhost:3000/dashboard?token="));

    let token = query_param(&location, "token").unwrap();
    let (status, me) = app.get("/api/v1/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user"]["email"], "oauth.user@example.com");
    assert_eq!(me["user"]["firstName"], "Ada");
    assert_eq!(me["user"]["emailVerified"], true);

    assert!(app.mailer.sent().iter().any(|m| m.subject.contains("Welcome")));

    // The state was consumed by the first callback.
    let (_, location) = follow(
        &app,
        &format!("/api/v1/auth/oauth/google/callback?code={GOOGLE_CODE}&state={state}"),
    )
    .await;
    assert_eq!(location, "http://localhost:3000/login?error=invalid_state");
}

#[tokio::test]
async fn callback_links_existing_password_account() {
    let app = spawn_app_with_config(oauth_config());
    let (user_id, _) = app.signed_in_user("oauth.user@example.com").await;
    let state = start(&app, "/").await;

    let (_, location) = follow(
        &app,
        &format!("/api/v1/auth/oauth/google/callback?code={GOOGLE_CODE}&state={state}"),
    )
    .await;
    assert!(location.contains("token="), "unexpected redirect: {location}");

    let user = app.repo.find_user_by_id(user_id).await.unwrap().unwrap();
    assert_eq!(user.google_id.as_deref(), Some("google-123"));
}

#[tokio::test]
async fn callback_failures_redirect_with_a_reason() {
    let app = spawn_app_with_config(oauth_config());

    let (_, location) = follow(&app, "/api/v1/auth/oauth/google/callback?error=access_denied").await;
    assert_eq!(location, "http://localhost:3000/login?error=access_denied");

    let (_, location) = follow(&app, "/api/v1/auth/oauth/google/callback?code=x").await;
    assert_eq!(location, "http://localhost:3000/login?error=missing_params");

    let (_, location) = follow(
        &app,
        "/api/v1/auth/oauth/google/callback?code=x&state=forged",
    )
    .await;
    assert_eq!(location, "http://localhost:3000/login?error=invalid_state");

    let state = start(&app, "/").await;
    let (_, location) = follow(
        &app,
        &format!("/api/v1/auth/oauth/google/callback?code=bad-code&state={state}"),
    )
    .await;
    assert_eq!(location, "http://localhost:3000/login?error=token_exchange_failed");
}

#[tokio::test]
async fn profile_failure_is_reported() {
    let provider = StaticOAuthProvider {
        fail_profile: true,
        ..StaticOAuthProvider::new(GOOGLE_CODE, google_profile())
    };
    let app = spawn_app_full(
        oauth_config(),
        MockStorageService::new(),
        MemoryMailer::new(),
        provider,
    );
    let state = start(&app, "/").await;

    let (_, location) = follow(
        &app,
        &format!("/api/v1/auth/oauth/google/callback?code={GOOGLE_CODE}&state={state}"),
    )
    .await;
    assert_eq!(location, "http://localhost:3000/login?error=user_info_failed");
}

#[tokio::test]
async fn suspended_accounts_cannot_sign_in_with_google() {
    let app = spawn_app_with_config(oauth_config());
    let (user_id, _) = app.signed_in_user("oauth.user@example.com").await;
    app.repo.set_user_status(user_id, "SUSPENDED").await.unwrap();
    let state = start(&app, "/").await;

    let (_, location) = follow(
        &app,
        &format!("/api/v1/auth/oauth/google/callback?code={GOOGLE_CODE}&state={state}"),
    )
    .await;
    assert_eq!(location, "http://localhost:3000/login?error=account_unavailable");
}

#[tokio::test]
async fn offsite_redirects_are_neutralised() {
    let app = spawn_app_with_config(oauth_config());
    let state = start(&app, "//evil.example").await;

    let (_, location) = follow(
        &app,
        &format!("/api/v1/auth/oauth/google/callback?code={GOOGLE_CODE}&state={state}"),
    )
    .await;
    assert!(location.starts_with("http://localhost:3000/?token="));
}

#[tokio::test]
async fn expired_state_is_rejected_and_consumed() {
    let app = spawn_app_with_config(oauth_config());
    let issued = Utc::now() - Duration::minutes(11);
    app.repo
        .create_oauth_state(OAuthState {
            state: "stale-state".to_string(),
            redirect_url: "/dashboard".to_string(),
            expires_at: issued + Duration::minutes(10),
            created_at: issued,
        })
        .await
        .unwrap();

    let (status, location) = follow(
        &app,
        &format!("/api/v1/auth/oauth/google/callback?code={GOOGLE_CODE}&state=stale-state"),
    )
    .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location, "http://localhost:3000/login?error=invalid_state");
    assert!(app.repo.take_oauth_state("stale-state").await.unwrap().is_none());
}
