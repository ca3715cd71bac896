//! Double-submit CSRF protection.
//!
//! The token handed out by `GET {prefix}/csrf-token` is `nonce.signature`, where the
//! signature binds the nonce to the server secret and the caller's client identifier.
//! State-changing requests must echo the cookie value in the `x-csrf-token` header.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::{ApiError, ApiResult},
    throttle::client_ip,
};

pub const CSRF_COOKIE: &str = "x-csrf-token";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Paths below the API prefix that skip the check; they are attempt-limited instead.
const EXEMPT_PATHS: &[&str] = &["/auth/login", "/auth/register"];

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CsrfTokenResponse {
    pub success: bool,
    pub csrf_token: String,
}

fn signature(secret: &str, client: &str, nonce: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b":");
    hasher.update(client.as_bytes());
    hasher.update(b":");
    hasher.update(nonce.as_bytes());
    hex::encode(hasher.finalize())
}

/// Mints a token bound to `client`.
pub fn generate_token(secret: &str, client: &str) -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    let sig = signature(secret, client, &nonce);
    format!("{nonce}.{sig}")
}

/// Checks the token was minted by this server for `client`.
pub fn verify_token(secret: &str, client: &str, token: &str) -> bool {
    let Some((nonce, sig)) = token.split_once('.') else {
        return false;
    };
    let expected = signature(secret, client, nonce);
    // Equal length is guaranteed for well-formed tokens; fold to avoid an early exit.
    expected.len() == sig.len()
        && expected
            .bytes()
            .zip(sig.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Reads one cookie from the `Cookie` header(s).
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

fn cookie_header(token: &str, config: &AppConfig) -> String {
    if config.is_production() {
        format!("{CSRF_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict; Secure")
    } else {
        format!("{CSRF_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
    }
}

/// csrf_token
///
/// Issues a fresh token in the body and the matching cookie.
#[utoipa::path(
    get,
    path = "/api/v1/csrf-token",
    responses((status = 200, description = "Fresh CSRF token", body = CsrfTokenResponse))
)]
pub async fn csrf_token(State(config): State<AppConfig>, headers: HeaderMap) -> ApiResult<Response> {
    let token = generate_token(&config.jwt_secret, &client_ip(&headers));
    let cookie = HeaderValue::from_str(&cookie_header(&token, &config))
        .map_err(|e| ApiError::internal(format!("invalid cookie header: {e}")))?;

    let mut response = Json(CsrfTokenResponse {
        success: true,
        csrf_token: token,
    })
    .into_response();
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}

fn requires_check(method: &Method, path: &str, config: &AppConfig) -> bool {
    if !config.csrf_enabled || matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS) {
        return false;
    }
    let Some(rest) = path.strip_prefix(config.api_prefix.as_str()) else {
        return false;
    };
    !EXEMPT_PATHS.iter().any(|exempt| rest.starts_with(exempt))
}

/// csrf_middleware
///
/// Rejects state-changing API requests whose header token is missing, differs from the
/// cookie, or was not signed for this client.
pub async fn csrf_middleware(
    State(config): State<AppConfig>,
    request: Request,
    next: Next,
) -> Response {
    if !requires_check(request.method(), request.uri().path(), &config) {
        return next.run(request).await;
    }

    let headers = request.headers();
    let header_token = headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok());
    let cookie_token = read_cookie(headers, CSRF_COOKIE);

    let valid = match (header_token, cookie_token) {
        (Some(h), Some(c)) => h == c && verify_token(&config.jwt_secret, &client_ip(headers), h),
        _ => false,
    };

    if !valid {
        tracing::warn!(path = %request.uri().path(), "csrf check failed");
        return ApiError::forbidden("CSRF_INVALID", "Invalid or missing CSRF token").into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_bound_to_client_and_secret() {
        let token = generate_token("secret", "1.2.3.4");
        assert!(verify_token("secret", "1.2.3.4", &token));
        assert!(!verify_token("secret", "5.6.7.8", &token));
        assert!(!verify_token("other", "1.2.3.4", &token));
        assert!(!verify_token("secret", "1.2.3.4", "garbage"));
    }

    #[test]
    fn exemptions() {
        let config = AppConfig::default();
        assert!(!requires_check(&Method::GET, "/api/v1/users/profile", &config));
        assert!(!requires_check(&Method::POST, "/api/v1/auth/login", &config));
        assert!(!requires_check(&Method::POST, "/health", &config));
        assert!(requires_check(&Method::POST, "/api/v1/auth/logout", &config));

        let disabled = AppConfig {
            csrf_enabled: false,
            ..AppConfig::default()
        };
        assert!(!requires_check(&Method::POST, "/api/v1/auth/logout", &disabled));
    }

    #[test]
    fn cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "a=1; x-csrf-token=abc.def; b=2".parse().unwrap());
        assert_eq!(read_cookie(&headers, CSRF_COOKIE), Some("abc.def"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }
}
