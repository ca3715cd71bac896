use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::config::OAuthClientConfig;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

#[derive(Error, Debug)]
pub enum OAuthError {
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("user info request failed: {0}")]
    UserInfo(String),
}

/// The identity the provider vouches for.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OAuthProfile {
    /// Provider-side account id.
    pub id: String,
    pub email: String,
    #[serde(rename = "given_name")]
    pub first_name: Option<String>,
    #[serde(rename = "family_name")]
    pub last_name: Option<String>,
    #[serde(rename = "picture")]
    pub avatar_url: Option<String>,
}

/// OAuthProvider
///
/// The authorization-code flow of one identity provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Where to send the browser to start the flow.
    fn authorization_url(&self, state: &str) -> String;

    /// Trades the callback `code` for a provider access token.
    async fn exchange_code(&self, code: &str) -> Result<String, OAuthError>;

    async fn fetch_profile(&self, access_token: &str) -> Result<OAuthProfile, OAuthError>;
}

pub type OAuthProviderState = Arc<dyn OAuthProvider>;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// GoogleOAuthClient
///
/// Google's OAuth 2.0 endpoints, requesting `openid email profile` with offline access.
pub struct GoogleOAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    callback_url: String,
}

impl GoogleOAuthClient {
    pub fn new(config: &OAuthClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: config.client_id.clone().unwrap_or_default(),
            client_secret: config.client_secret.clone().unwrap_or_default(),
            callback_url: config.callback_url.clone(),
        }
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuthClient {
    fn authorization_url(&self, state: &str) -> String {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.callback_url.as_str()),
            ("response_type", "code"),
            ("scope", "openid email profile"),
            ("state", state),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{GOOGLE_AUTH_URL}?{query}")
    }

    async fn exchange_code(&self, code: &str) -> Result<String, OAuthError> {
        let response = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.callback_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| OAuthError::TokenExchange(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::TokenExchange(format!("{status}: {body}")));
        }

        response
            .json::<TokenResponse>()
            .await
            .map(|t| t.access_token)
            .map_err(|e| OAuthError::TokenExchange(e.to_string()))
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<OAuthProfile, OAuthError> {
        let response = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| OAuthError::UserInfo(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OAuthError::UserInfo(response.status().to_string()));
        }

        response
            .json::<OAuthProfile>()
            .await
            .map_err(|e| OAuthError::UserInfo(e.to_string()))
    }
}

/// StaticOAuthProvider
///
/// Test double that accepts one code and returns a fixed profile.
#[derive(Clone)]
pub struct StaticOAuthProvider {
    pub valid_code: String,
    pub profile: OAuthProfile,
    pub fail_profile: bool,
}

impl StaticOAuthProvider {
    pub fn new(valid_code: &str, profile: OAuthProfile) -> Self {
        Self {
            valid_code: valid_code.to_string(),
            profile,
            fail_profile: false,
        }
    }
}

#[async_trait]
impl OAuthProvider for StaticOAuthProvider {
    fn authorization_url(&self, state: &str) -> String {
        format!("https://idp.test/authorize?state={}", urlencoding::encode(state))
    }

    async fn exchange_code(&self, code: &str) -> Result<String, OAuthError> {
        if code == self.valid_code {
            Ok("provider-access-token".to_string())
        } else {
            Err(OAuthError::TokenExchange("invalid_grant".to_string()))
        }
    }

    async fn fetch_profile(&self, _access_token: &str) -> Result<OAuthProfile, OAuthError> {
        if self.fail_profile {
            return Err(OAuthError::UserInfo("503 Service Unavailable".to_string()));
        }
        Ok(self.profile.clone())
    }
}

/// safe_redirect
///
/// Post-login redirects must stay on this site: a single leading `/`, no scheme,
/// no protocol-relative `//host`. Anything else collapses to `/`.
pub fn safe_redirect(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}
