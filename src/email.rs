//! # Email Module
//!
//! Sends the finished report as an HTML e-mail. The markdown is rendered
//! with `pulldown-cmark`, a subject line is taken from the report itself,
//! and delivery goes through a [`MailDispatcher`] (SendGrid in production).
//!
//! Mailing never fails the session: every problem becomes an
//! [`EmailDispatchOutcome`] with `status: error`.

use async_trait::async_trait;
use pulldown_cmark::{html, Options, Parser};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::EmailConfig;
use crate::error::DispatchError;
use crate::types::{EmailDispatchOutcome, Report};

const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com";

/// Subjects longer than this are cut at a word boundary.
const MAX_SUBJECT_CHARS: usize = 78;

// =============================================================================
// MAIL MESSAGE
// =============================================================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub content_type: String,
    pub body: String,
}

// =============================================================================
// DISPATCH CAPABILITY
// =============================================================================
/// The outbound mail capability. Returns the provider's status code.
#[async_trait]
pub trait MailDispatcher: Send + Sync {
    async fn dispatch(&self, message: &MailMessage) -> Result<u16, DispatchError>;
}

/// SendGrid v3 `mail/send` client.
///
/// One instance is shared for the whole process; it keeps no per-send
/// state beyond the connection pool inside `reqwest::Client`.
pub struct SendGridMailer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct SendGridRequest<'a> {
    personalizations: [Personalization<'a>; 1],
    from: Address<'a>,
    subject: &'a str,
    content: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: [Address<'a>; 1],
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

impl SendGridMailer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: SENDGRID_ENDPOINT.to_string(),
        }
    }

    /// Send to another host (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl MailDispatcher for SendGridMailer {
    async fn dispatch(&self, message: &MailMessage) -> Result<u16, DispatchError> {
        let body = SendGridRequest {
            personalizations: [Personalization {
                to: [Address { email: &message.to }],
            }],
            from: Address {
                email: &message.from,
            },
            subject: &message.subject,
            content: [Content {
                content_type: &message.content_type,
                value: &message.body,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(30))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(status.as_u16());
        }

        let error_text = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 | 403 => Err(DispatchError::Unauthorized),
            code => Err(DispatchError::Http(code, error_text)),
        }
    }
}

// =============================================================================
// EMAILER
// =============================================================================
/// Formats a [`Report`] and hands it to a [`MailDispatcher`].
#[derive(Clone)]
pub struct Emailer {
    dispatcher: Arc<dyn MailDispatcher>,
    from: String,
    to: String,
}

impl Emailer {
    pub fn new(
        dispatcher: Arc<dyn MailDispatcher>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            from: from.into(),
            to: to.into(),
        }
    }

    /// SendGrid-backed emailer, or `None` when no API key is configured.
    pub fn from_config(config: &EmailConfig) -> Option<Self> {
        let api_key = config.api_key.as_ref()?;
        Some(Self::new(
            Arc::new(SendGridMailer::new(api_key)),
            &config.from,
            &config.to,
        ))
    }

    pub fn compose(&self, report: &Report) -> MailMessage {
        MailMessage {
            from: self.from.clone(),
            to: self.to.clone(),
            subject: subject_line(report),
            content_type: "text/html".to_string(),
            body: render_html(report),
        }
    }

    pub async fn send_report(&self, report: &Report) -> EmailDispatchOutcome {
        let message = self.compose(report);
        info!(to = %message.to, subject = %message.subject, "Sending report e-mail");

        match self.dispatcher.dispatch(&message).await {
            Ok(code) => {
                info!(status = code, "E-mail accepted");
                EmailDispatchOutcome::success(format!("Email sent with status code: {}", code))
            }
            Err(e) => {
                warn!(error = %e, "E-mail dispatch failed");
                EmailDispatchOutcome::error(format!("Failed to send email: {}", e))
            }
        }
    }
}

/// Subject from the report's first heading, falling back to its summary.
fn subject_line(report: &Report) -> String {
    let heading = report
        .markdown_report
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with('#'))
        .map(|line| line.trim_start_matches('#').trim())
        .filter(|text| !text.is_empty());

    let subject = match heading {
        Some(text) => text.to_string(),
        None if !report.short_summary.trim().is_empty() => {
            format!("Research report: {}", report.short_summary.trim())
        }
        None => "Research report".to_string(),
    };

    truncate_words(&subject, MAX_SUBJECT_CHARS)
}

fn truncate_words(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let mut out = String::new();
    for word in text.split_whitespace() {
        let extra = if out.is_empty() { 0 } else { 1 };
        if out.chars().count() + extra + word.chars().count() + 3 > max_chars {
            break;
        }
        if extra == 1 {
            out.push(' ');
        }
        out.push_str(word);
    }
    if out.is_empty() {
        out = text.chars().take(max_chars.saturating_sub(3)).collect();
    }
    out.push_str("...");
    out
}

/// The HTML e-mail body: summary paragraph followed by the report.
fn render_html(report: &Report) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let markdown = report.to_markdown();
    let mut body = String::with_capacity(markdown.len() * 2);
    html::push_html(&mut body, Parser::new_ext(&markdown, options));

    let mut summary = String::new();
    html::push_html(&mut summary, Parser::new(report.short_summary.trim()));

    format!(
        "<!DOCTYPE html>\n<html>\n<body style=\"font-family: sans-serif; line-height: 1.5;\">\n\
         <div style=\"color: #555;\"><em>{}</em></div>\n<hr>\n{}</body>\n</html>\n",
        summary.trim(),
        body
    )
}
