#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use meyden_api::{
    AppConfig, AppState, InMemoryRepository, MemoryMailer, MockStorageService,
    StaticOAuthProvider, Throttle, create_router,
    config::RateLimit,
    oauth::OAuthProfile,
    repository::Repository,
};
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tower::util::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "Str0ng!Passw0rd";
pub const GOOGLE_CODE: &str = "good-code";

/// An in-process app wired to in-memory doubles.
pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryRepository>,
    pub mailer: Arc<MemoryMailer>,
    pub config: AppConfig,
}

/// Defaults for router tests: CSRF off and attempt limits high enough not to interfere.
pub fn test_config() -> AppConfig {
    let generous = RateLimit {
        max_attempts: 1_000,
        window: Duration::from_secs(60),
    };
    AppConfig {
        csrf_enabled: false,
        login_limit: generous,
        register_limit: generous,
        api_limit: generous,
        ..AppConfig::default()
    }
}

pub fn google_profile() -> OAuthProfile {
    OAuthProfile {
        id: "google-123".to_string(),
        email: "Oauth.User@Example.com".to_string(),
        first_name: Some("Ada".to_string()),
        last_name: Some("Lovelace".to_string()),
        avatar_url: Some("https://img.example.com/ada.png".to_string()),
    }
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(test_config(), MockStorageService::new(), MemoryMailer::new())
}

pub fn spawn_app_with_config(config: AppConfig) -> TestApp {
    spawn_app_with(config, MockStorageService::new(), MemoryMailer::new())
}

pub fn spawn_app_with(
    config: AppConfig,
    storage: MockStorageService,
    mailer: MemoryMailer,
) -> TestApp {
    spawn_app_full(
        config,
        storage,
        mailer,
        StaticOAuthProvider::new(GOOGLE_CODE, google_profile()),
    )
}

pub fn spawn_app_full(
    config: AppConfig,
    storage: MockStorageService,
    mailer: MemoryMailer,
    google: StaticOAuthProvider,
) -> TestApp {
    let repo = Arc::new(InMemoryRepository::new());
    let mailer = Arc::new(mailer);

    let state = AppState {
        repo: repo.clone(),
        storage: Arc::new(storage),
        mailer: mailer.clone(),
        google: Arc::new(google),
        throttle: Arc::new(Throttle::new(&config)),
        config: config.clone(),
    };

    TestApp {
        router: create_router(state),
        repo,
        mailer,
        config,
    }
}

impl TestApp {
    /// Sends one request through the router and decodes the JSON body (Null when empty).
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn register(&self, email: &str) -> (StatusCode, Value) {
        self.post(
            "/api/v1/auth/register",
            None,
            json!({
                "email": email,
                "password": PASSWORD,
                "firstName": "Test",
                "lastName": "User",
            }),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.post(
            "/api/v1/auth/login",
            None,
            json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Registers and logs in a fresh account, returning its id and access token.
    pub async fn signed_in_user(&self, email: &str) -> (Uuid, String) {
        let (status, body) = self.register(email).await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        let (status, body) = self.login(email, PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        let id = body["user"]["id"].as_str().unwrap().parse().unwrap();
        let token = body["tokens"]["accessToken"].as_str().unwrap().to_string();
        (id, token)
    }

    /// A signed-in account with the given role set directly in the store.
    pub async fn signed_in_with_role(&self, email: &str, role: &str) -> (Uuid, String) {
        let (id, token) = self.signed_in_user(email).await;
        self.repo.set_user_role(id, role).await.unwrap();
        (id, token)
    }

    /// Creates a vendor owned by a new account and approves it.
    pub async fn active_vendor(&self, owner_email: &str) -> (Uuid, Uuid, String) {
        let (owner_id, owner_token) = self.signed_in_user(owner_email).await;
        let (status, body) = self
            .post("/api/v1/vendors", Some(&owner_token), vendor_payload("Acme AI"))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create vendor failed: {body}");
        let vendor_id: Uuid = body["vendor"]["id"].as_str().unwrap().parse().unwrap();
        self.repo
            .set_vendor_status(vendor_id, "ACTIVE")
            .await
            .unwrap();
        (vendor_id, owner_id, owner_token)
    }
}

pub fn vendor_payload(company: &str) -> Value {
    json!({
        "companyName": company,
        "businessName": format!("{company} Ltd"),
        "description": "Applied machine learning consultancy.",
        "email": "Hello@Acme.example",
        "businessType": "Consulting",
        "country": "Kenya",
        "city": "Nairobi",
    })
}

pub fn error_code(body: &Value) -> &str {
    body["code"].as_str().unwrap_or_default()
}
