use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::{config::AppConfig, sanitize::mask_email};

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

/// An outgoing message.
#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Error, Debug)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("mock mailer failure")]
    Simulated,
}

// 1. Mailer Contract
/// Mailer
///
/// Outgoing email delivery. Handlers never fail a request because mail could not be
/// sent; they go through `deliver`, which logs and swallows the error.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

pub type MailerState = Arc<dyn Mailer>;

/// Picks the Resend transport when an API key is configured, otherwise logs messages.
pub fn mailer_from_config(config: &AppConfig) -> MailerState {
    match &config.resend_api_key {
        Some(key) => Arc::new(ResendMailer::new(
            key.clone(),
            format!("{} <{}>", config.mail_from_name, config.mail_from),
        )),
        None => {
            tracing::warn!("RESEND_API_KEY not set; outgoing mail will only be logged");
            Arc::new(LogMailer)
        }
    }
}

/// Sends and reports the outcome without propagating failures.
pub async fn deliver(mailer: &MailerState, email: Email) -> bool {
    let to = mask_email(&email.to);
    let subject = email.subject.clone();
    match mailer.send(email).await {
        Ok(()) => {
            tracing::info!(to = %to, subject = %subject, "email sent");
            true
        }
        Err(e) => {
            tracing::error!(to = %to, subject = %subject, error = %e, "email delivery failed");
            false
        }
    }
}

// 2. The Real Implementation (Resend HTTP API)
#[derive(Serialize)]
struct ResendPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

pub struct ResendMailer {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

impl ResendMailer {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let response = self
            .client
            .post(RESEND_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&ResendPayload {
                from: &self.from,
                to: &email.to,
                subject: &email.subject,
                html: &email.html,
                text: &email.text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// LogMailer
///
/// Development transport: records the envelope in the log and reports success.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        tracing::info!(
            to = %mask_email(&email.to),
            subject = %email.subject,
            "email not sent (no mail provider configured)"
        );
        Ok(())
    }
}

// 3. The Mock Implementation (For Tests)
/// MemoryMailer
///
/// Captures every message so tests can read links back out of them.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<Email>>,
    pub should_fail: bool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        if self.should_fail {
            return Err(MailError::Simulated);
        }
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(email);
        Ok(())
    }
}

// 4. Templates

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn layout(heading: &str, body: &str) -> String {
    format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
         <div style=\"background: #667eea; padding: 30px; text-align: center;\">\
         <h1 style=\"color: white; margin: 0;\">Meyden Platform</h1></div>\
         <div style=\"padding: 30px; background: #f9fafb;\">\
         <h2 style=\"color: #1f2937;\">{heading}</h2>{body}</div></div>"
    )
}

fn button(href: &str, label: &str) -> String {
    format!(
        "<div style=\"text-align: center; margin: 30px 0;\">\
         <a href=\"{href}\" style=\"background: #667eea; color: white; padding: 14px 30px; \
         text-decoration: none; border-radius: 8px; font-weight: bold;\">{label}</a></div>"
    )
}

/// Link lands on the API's verify endpoint and expires in 24 hours.
pub fn verification_email(to: &str, token: &str, config: &AppConfig) -> Email {
    let url = format!(
        "{}{}/auth/verify-email?token={}",
        config.app_url,
        config.api_prefix,
        urlencoding::encode(token)
    );
    Email {
        to: to.to_string(),
        subject: "Verify your Meyden account".to_string(),
        html: layout(
            "Verify Your Email",
            &format!(
                "<p>Thank you for registering with Meyden. Please verify your email address.</p>{}\
                 <p style=\"color: #9ca3af; font-size: 12px;\">This link expires in 24 hours.</p>",
                button(&url, "Verify Email")
            ),
        ),
        text: format!("Verify your Meyden account: {url}\nThis link expires in 24 hours."),
    }
}

/// Link lands on the frontend reset page and expires in 1 hour.
pub fn password_reset_email(to: &str, token: &str, config: &AppConfig) -> Email {
    let url = format!(
        "{}/reset-password?token={}",
        config.frontend_url,
        urlencoding::encode(token)
    );
    Email {
        to: to.to_string(),
        subject: "Reset your Meyden password".to_string(),
        html: layout(
            "Password Reset",
            &format!(
                "<p>You requested a password reset. Use the button below to set a new password.</p>{}\
                 <p style=\"color: #9ca3af; font-size: 12px;\">This link expires in 1 hour. \
                 If you didn't request this, ignore this email.</p>",
                button(&url, "Reset Password")
            ),
        ),
        text: format!("Reset your Meyden password: {url}\nThis link expires in 1 hour."),
    }
}

pub fn welcome_email(to: &str, first_name: &str, config: &AppConfig) -> Email {
    let name = escape_html(first_name);
    Email {
        to: to.to_string(),
        subject: "Welcome to Meyden!".to_string(),
        html: layout(
            &format!("Hello {name}!"),
            &format!(
                "<p>Thank you for joining Meyden Platform. Discover AI-ready vendors, assess your \
                 organization's AI readiness and join the community discussions.</p>{}",
                button(&config.frontend_url, "Get Started")
            ),
        ),
        text: format!("Hello {first_name}! Welcome to Meyden: {}", config.frontend_url),
    }
}

/// Inquiry forwarded from the public vendor page to the vendor's contact address.
pub fn vendor_contact_email(
    vendor_email: &str,
    vendor_name: &str,
    sender_name: &str,
    sender_email: &str,
    message: &str,
) -> Email {
    Email {
        to: vendor_email.to_string(),
        subject: format!("New inquiry from {sender_name}"),
        html: layout(
            "New Contact Request",
            &format!(
                "<p>Hi {},</p><p>You have received a new inquiry through Meyden Platform:</p>\
                 <div style=\"background: white; padding: 20px; border-left: 4px solid #10b981;\">\
                 <p><strong>From:</strong> {}</p><p><strong>Email:</strong> {}</p>\
                 <p style=\"white-space: pre-wrap;\">{}</p></div>",
                escape_html(vendor_name),
                escape_html(sender_name),
                escape_html(sender_email),
                escape_html(message)
            ),
        ),
        text: format!("From: {sender_name} <{sender_email}>\n\n{message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_link_points_at_api() {
        let config = AppConfig::default();
        let email = verification_email("a@b.io", "tok123", &config);
        assert!(
            email
                .text
                .contains("http://localhost:3001/api/v1/auth/verify-email?token=tok123")
        );
    }

    #[test]
    fn reset_link_points_at_frontend() {
        let config = AppConfig::default();
        let email = password_reset_email("a@b.io", "tok", &config);
        assert!(email.html.contains("http://localhost:3000/reset-password?token=tok"));
    }

    #[test]
    fn contact_email_escapes_user_input() {
        let email = vendor_contact_email("v@x.io", "Acme", "<b>Eve</b>", "e@x.io", "hi <script>");
        assert!(!email.html.contains("<script>"));
        assert!(email.html.contains("&lt;b&gt;Eve&lt;/b&gt;"));
    }

    #[tokio::test]
    async fn deliver_swallows_failures() {
        let failing: MailerState = Arc::new(MemoryMailer::new_failing());
        assert!(!deliver(&failing, welcome_email("a@b.io", "Ann", &AppConfig::default())).await);

        let memory = Arc::new(MemoryMailer::new());
        let state: MailerState = memory.clone();
        assert!(deliver(&state, welcome_email("a@b.io", "Ann", &AppConfig::default())).await);
        assert_eq!(memory.sent().len(), 1);
    }
}
