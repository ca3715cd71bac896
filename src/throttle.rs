use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::{
    config::{AppConfig, RateLimit},
    error::{ApiError, ApiResult},
};

/// The request classes guarded by limits. `Api` covers every request under the API prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThrottleScope {
    Login,
    Register,
    Api,
}

/// Throttle
///
/// Sliding-window attempt limiter keyed by scope and client IP. Each key keeps the
/// instants of its recent attempts; anything older than the window is dropped on access.
pub struct Throttle {
    login: RateLimit,
    register: RateLimit,
    api: RateLimit,
    attempts: Mutex<HashMap<(ThrottleScope, String), VecDeque<Instant>>>,
}

pub type ThrottleState = Arc<Throttle>;

impl Throttle {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            login: config.login_limit,
            register: config.register_limit,
            api: config.api_limit,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    fn limit(&self, scope: ThrottleScope) -> RateLimit {
        match scope {
            ThrottleScope::Login => self.login,
            ThrottleScope::Register => self.register,
            ThrottleScope::Api => self.api,
        }
    }

    /// Records an attempt, or rejects it with the seconds until the oldest one expires.
    pub fn check(&self, scope: ThrottleScope, client: &str) -> ApiResult<()> {
        self.check_at(scope, client, Instant::now())
    }

    fn check_at(&self, scope: ThrottleScope, client: &str, now: Instant) -> ApiResult<()> {
        let limit = self.limit(scope);
        let mut attempts = self
            .attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let window = attempts.entry((scope, client.to_string())).or_default();

        while window
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= limit.window)
        {
            window.pop_front();
        }

        if window.len() >= limit.max_attempts {
            let oldest = window.front().copied().unwrap_or(now);
            let remaining = limit
                .window
                .saturating_sub(now.saturating_duration_since(oldest));
            let retry_after = remaining.as_secs().max(1);
            tracing::warn!(?scope, client, retry_after, "attempt limit reached");
            return Err(ApiError::TooManyRequests {
                message: match scope {
                    ThrottleScope::Login => {
                        "Too many login attempts, please try again later".to_string()
                    }
                    ThrottleScope::Register => {
                        "Too many registration attempts, please try again later".to_string()
                    }
                    ThrottleScope::Api => {
                        "Too many requests from this IP, please try again later".to_string()
                    }
                },
                retry_after,
            });
        }

        window.push_back(now);
        Ok(())
    }

    /// Forgets every key whose newest attempt is outside its window.
    pub fn prune(&self) {
        let now = Instant::now();
        let mut attempts = self
            .attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        attempts.retain(|(scope, _), window| {
            let span = self.limit(*scope).window;
            window
                .back()
                .is_some_and(|t| now.saturating_duration_since(*t) < span)
        });
    }
}

/// api_rate_limit
///
/// Middleware applying the per-IP request limit to everything it wraps.
pub async fn api_rate_limit(
    State(throttle): State<ThrottleState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    throttle.check(ThrottleScope::Api, &client_ip(request.headers()))?;
    Ok(next.run(request).await)
}

/// client_ip
///
/// First `X-Forwarded-For` hop, then `X-Real-IP`, else `"unknown"`.
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .unwrap_or("unknown")
        .to_string()
}

/// Spawns the background task that keeps the attempt map from growing without bound.
pub fn spawn_pruner(throttle: ThrottleState, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            throttle.prune();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle() -> Throttle {
        Throttle::new(&AppConfig::default())
    }

    #[test]
    fn login_allows_five_then_blocks() {
        let t = throttle();
        let now = Instant::now();
        for _ in 0..5 {
            assert!(t.check_at(ThrottleScope::Login, "1.2.3.4", now).is_ok());
        }
        let err = t.check_at(ThrottleScope::Login, "1.2.3.4", now).unwrap_err();
        match err {
            ApiError::TooManyRequests { retry_after, .. } => assert_eq!(retry_after, 15 * 60),
            other => panic!("unexpected {other:?}"),
        }
        // Other clients and scopes are unaffected.
        assert!(t.check_at(ThrottleScope::Login, "5.6.7.8", now).is_ok());
        assert!(t.check_at(ThrottleScope::Register, "1.2.3.4", now).is_ok());
    }

    #[test]
    fn window_slides() {
        let t = throttle();
        let start = Instant::now();
        for _ in 0..3 {
            t.check_at(ThrottleScope::Register, "ip", start).unwrap();
        }
        assert!(t.check_at(ThrottleScope::Register, "ip", start).is_err());
        let later = start + Duration::from_secs(60 * 60);
        assert!(t.check_at(ThrottleScope::Register, "ip", later).is_ok());
    }

    #[test]
    fn api_scope_is_independent() {
        let t = Throttle::new(&AppConfig {
            api_limit: RateLimit {
                max_attempts: 2,
                window: Duration::from_secs(60),
            },
            ..AppConfig::default()
        });
        let now = Instant::now();
        assert!(t.check_at(ThrottleScope::Api, "ip", now).is_ok());
        assert!(t.check_at(ThrottleScope::Api, "ip", now).is_ok());
        assert!(t.check_at(ThrottleScope::Api, "ip", now).is_err());
        assert!(t.check_at(ThrottleScope::Login, "ip", now).is_ok());
    }

    #[test]
    fn client_ip_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "unknown");
        headers.insert("x-real-ip", "10.0.0.2".parse().unwrap());
        assert_eq!(client_ip(&headers), "10.0.0.2");
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers), "203.0.113.9");
    }
}
