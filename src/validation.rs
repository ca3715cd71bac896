use axum::{
    Json,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;

use crate::error::{ApiError, FieldError};

/// Validate
///
/// Implemented by every request body. Returns all rule violations at once so the client
/// can highlight each offending field in a single round trip.
pub trait Validate {
    fn validate(&self) -> Result<(), Vec<FieldError>>;
}

/// ValidatedJson
///
/// Drop-in replacement for `axum::Json` on request bodies. A body that fails to parse is
/// reported as a `VALIDATION_ERROR` on the `body` field instead of axum's plain-text
/// rejection, then the type's own `Validate` rules run.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::invalid_field("body", &rejection.body_text()))?;
        value.validate().map_err(ApiError::Validation)?;
        Ok(Self(value))
    }
}

/// Validator
///
/// Accumulates field errors. Rules are chainable and never short-circuit.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    pub fn required(&mut self, field: &str, value: &str) -> &mut Self {
        self.check(!value.trim().is_empty(), field, "is required")
    }

    /// Length in characters, inclusive on both ends.
    pub fn length(&mut self, field: &str, value: &str, min: usize, max: usize) -> &mut Self {
        let len = value.trim().chars().count();
        let message = if max == usize::MAX {
            format!("must be at least {min} characters")
        } else {
            format!("must be between {min} and {max} characters")
        };
        self.check(len >= min && len <= max, field, &message)
    }

    pub fn max_length(&mut self, field: &str, value: Option<&str>, max: usize) -> &mut Self {
        match value {
            Some(v) => self.check(
                v.chars().count() <= max,
                field,
                &format!("must be at most {max} characters"),
            ),
            None => self,
        }
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        self.check(is_valid_email(value), field, "must be a valid email address")
    }

    pub fn url(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        match value {
            Some(v) if !v.trim().is_empty() => {
                self.check(is_valid_url(v), field, "must be a valid http(s) URL")
            }
            _ => self,
        }
    }

    pub fn range<T: PartialOrd + std::fmt::Display>(
        &mut self,
        field: &str,
        value: Option<T>,
        min: T,
        max: T,
    ) -> &mut Self {
        match value {
            Some(v) => {
                let message = format!("must be between {min} and {max}");
                self.check(v >= min && v <= max, field, &message)
            }
            None => self,
        }
    }

    pub fn one_of(&mut self, field: &str, value: Option<&str>, allowed: &[&str]) -> &mut Self {
        match value {
            Some(v) => {
                let message = format!("must be one of: {}", allowed.join(", "));
                self.check(allowed.contains(&v), field, &message)
            }
            None => self,
        }
    }

    /// Merges errors reported by a nested value under a prefixed field name.
    pub fn nested(&mut self, prefix: &str, result: Result<(), Vec<FieldError>>) -> &mut Self {
        if let Err(errors) = result {
            self.errors.extend(
                errors
                    .into_iter()
                    .map(|e| FieldError::new(format!("{prefix}.{}", e.field), e.message)),
            );
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), Vec<FieldError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }
}

/// Emails are compared and stored trimmed and lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Exactly one `@`, no whitespace, and a dot inside the domain with text on both sides.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() {
        return false;
    }
    match domain.rfind('.') {
        Some(dot) => dot > 0 && dot < domain.len() - 1,
        None => false,
    }
}

pub fn is_valid_url(value: &str) -> bool {
    match reqwest::Url::parse(value.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_rules() {
        assert!(is_valid_email("jane@example.com"));
        assert!(is_valid_email("  jane.doe+x@sub.example.co "));
        assert!(!is_valid_email("jane@example"));
        assert!(!is_valid_email("jane@@example.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("jane @example.com"));
        assert!(!is_valid_email("jane@example."));
    }

    #[test]
    fn url_rules() {
        assert!(is_valid_url("https://meyden.io"));
        assert!(is_valid_url("http://localhost:3000/path"));
        assert!(!is_valid_url("ftp://files.example.com"));
        assert!(!is_valid_url("not a url"));
    }

    #[test]
    fn validator_collects_every_failure() {
        let mut v = Validator::new();
        v.required("firstName", " ")
            .email("email", "nope")
            .range("rating", Some(7), 1, 5)
            .one_of("role", Some("ADMIN"), &["USER", "VENDOR"]);
        let errors = v.finish().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["firstName", "email", "rating", "role"]);
    }

    #[test]
    fn nested_errors_are_prefixed() {
        let mut v = Validator::new();
        v.nested(
            "questions[0]",
            Err(vec![FieldError::new("text", "is required")]),
        );
        let errors = v.finish().unwrap_err();
        assert_eq!(errors[0].field, "questions[0].text");
    }

    #[test]
    fn normalizes_email() {
        assert_eq!(normalize_email("  Jane@Example.COM "), "jane@example.com");
    }
}
