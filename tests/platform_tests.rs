mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use common::{TestApp, error_code, spawn_app, spawn_app_with_config, test_config};
use meyden_api::{AppConfig, config::RateLimit};
use std::time::Duration;
use serde_json::Value;
use tower::util::ServiceExt;

async fn raw(app: &TestApp, request: Request<Body>) -> axum::response::Response {
    app.router.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_database_state() {
    let app = spawn_app();
    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["database"], "CONNECTED");
    assert_eq!(body["environment"], "local");
}

#[tokio::test]
async fn index_lists_mounted_areas() {
    let app = spawn_app();
    let (status, body) = app.get("/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], "v1");
    assert_eq!(body["endpoints"]["auth"], "/api/v1/auth");
    assert_eq!(body["endpoints"]["community"], "/api/v1/community");
}

#[tokio::test]
async fn unknown_routes_get_a_json_404() {
    let app = spawn_app();
    let (status, body) = app.get("/api/v1/nothing-here", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "ROUTE_NOT_FOUND");
}

#[tokio::test]
async fn responses_carry_security_headers_and_request_id() {
    let app = spawn_app();
    let response = raw(
        &app,
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;
    let headers = response.headers();
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let app = spawn_app();
    let response = raw(
        &app,
        Request::post("/api/v1/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(error_code(&body), "VALIDATION_ERROR");
    assert_eq!(body["details"][0]["field"], "body");
}

#[tokio::test]
async fn csrf_double_submit_is_enforced() {
    let app = spawn_app_with_config(AppConfig {
        csrf_enabled: true,
        ..test_config()
    });
    let (_, access) = app.signed_in_user("csrf@example.com").await;

    // Missing token.
    let (status, body) = app
        .send(Method::POST, "/api/v1/auth/logout", Some(&access), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "CSRF_INVALID");

    let response = raw(
        &app,
        Request::get("/api/v1/csrf-token").body(Body::empty()).unwrap(),
    )
    .await;
    assert!(
        response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .contains("HttpOnly")
    );
    let token = json_body(response).await["csrfToken"]
        .as_str()
        .unwrap()
        .to_string();

    // Header without the matching cookie.
    let response = raw(
        &app,
        Request::post("/api/v1/auth/logout")
            .header("x-csrf-token", &token)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = raw(
        &app,
        Request::post("/api/v1/auth/logout")
            .header(header::AUTHORIZATION, format!("Bearer {access}"))
            .header("x-csrf-token", &token)
            .header(header::COOKIE, format!("x-csrf-token={token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn csrf_token_is_bound_to_the_client() {
    let app = spawn_app_with_config(AppConfig {
        csrf_enabled: true,
        ..test_config()
    });
    let response = raw(
        &app,
        Request::get("/api/v1/csrf-token")
            .header("x-forwarded-for", "10.0.0.1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let token = json_body(response).await["csrfToken"]
        .as_str()
        .unwrap()
        .to_string();

    let response = raw(
        &app,
        Request::post("/api/v1/auth/logout")
            .header("x-forwarded-for", "10.0.0.2")
            .header("x-csrf-token", &token)
            .header(header::COOKIE, format!("x-csrf-token={token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn api_requests_are_limited_per_client() {
    let app = spawn_app_with_config(AppConfig {
        api_limit: RateLimit {
            max_attempts: 3,
            window: Duration::from_secs(15 * 60),
        },
        ..test_config()
    });
    let from = |ip: &str| {
        Request::get("/api/v1/vendors")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..3 {
        assert_eq!(raw(&app, from("10.1.1.1")).await.status(), StatusCode::OK);
    }
    let response = raw(&app, from("10.1.1.1")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    let body = json_body(response).await;
    assert_eq!(error_code(&body), "RATE_LIMITED");
    assert!(body["retryAfter"].as_u64().unwrap() > 0);

    // Other clients and /health are unaffected.
    assert_eq!(raw(&app, from("10.2.2.2")).await.status(), StatusCode::OK);
    let (status, _) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
}
