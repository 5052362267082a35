//! Email delivery.

use super::{ApiAuth, RemoteApi};
use crate::types::Provider;
use async_trait::async_trait;
use commerce_common::PlatformError;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// Default SendGrid API endpoint.
pub const SENDGRID_API_BASE: &str = "https://api.sendgrid.com";

/// Port on which SMTP uses implicit TLS instead of STARTTLS.
const SMTPS_PORT: u16 = 465;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// An outgoing message.
#[derive(Debug, Clone, Default)]
pub struct EmailMessage {
    /// Recipient addresses
    pub to: Vec<String>,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub text_body: String,
    /// Optional HTML alternative
    pub html_body: Option<String>,
    /// Optional reply-to address
    pub reply_to: Option<String>,
}

impl EmailMessage {
    fn check(&self) -> Result<(), PlatformError> {
        if self.to.is_empty() {
            return Err(PlatformError::invalid_input("message has no recipients"));
        }
        if self.subject.trim().is_empty() {
            return Err(PlatformError::invalid_input("subject is required"));
        }
        Ok(())
    }
}

/// Sends transactional email for a tenant.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Configured provider name.
    fn provider_name(&self) -> &'static str;

    /// Deliver `message` from the tenant's configured sender address.
    async fn send(&self, message: &EmailMessage) -> Result<(), PlatformError>;
}

fn parse_mailbox(address: &str) -> Result<Mailbox, PlatformError> {
    address
        .parse()
        .map_err(|e| PlatformError::invalid_input(format!("invalid address {address:?}: {e}")))
}

fn smtp_error(e: &lettre::transport::smtp::Error) -> PlatformError {
    if e.is_timeout() {
        PlatformError::Timeout(e.to_string())
    } else if e.is_permanent() {
        PlatformError::Rejected {
            status: e
                .status()
                .and_then(|code| code.to_string().parse().ok())
                .unwrap_or_default(),
            message: e.to_string(),
        }
    } else {
        PlatformError::unavailable(e.to_string())
    }
}

/// Email over an authenticated SMTP relay.
///
/// Port 465 uses implicit TLS; any other port upgrades with STARTTLS.
pub struct SmtpSender {
    host: String,
    port: u16,
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpSender {
    /// Build the relay transport. No connection is opened until the first send.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::InvalidInput`] if the sender address does not
    /// parse, or [`PlatformError::Internal`] if TLS parameters cannot be built
    /// for `host`.
    pub fn new(
        host: &str,
        port: u16,
        username: String,
        password: &SecretString,
        from_address: &str,
    ) -> Result<Self, PlatformError> {
        let from = parse_mailbox(from_address)?;
        let builder = if port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| PlatformError::internal(format!("SMTP relay {host}: {e}")))?;

        let transport = builder
            .port(port)
            .credentials(Credentials::new(
                username,
                password.expose_secret().to_string(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self {
            host: host.to_string(),
            port,
            from,
            transport,
        })
    }

    fn build_message(&self, message: &EmailMessage) -> Result<Message, PlatformError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(message.subject.clone());
        for to in &message.to {
            builder = builder.to(parse_mailbox(to)?);
        }
        if let Some(reply_to) = &message.reply_to {
            builder = builder.reply_to(parse_mailbox(reply_to)?);
        }

        let built = match &message.html_body {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(
                message.text_body.clone(),
                html.clone(),
            )),
            None => builder.singlepart(SinglePart::plain(message.text_body.clone())),
        };
        built.map_err(|e| PlatformError::invalid_input(e.to_string()))
    }
}

impl fmt::Debug for SmtpSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSender")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("from", &self.from.email.to_string())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EmailSender for SmtpSender {
    fn provider_name(&self) -> &'static str {
        Provider::Smtp.name()
    }

    #[instrument(
        skip(self, message),
        fields(host = %self.host, port = self.port, recipients = message.to.len())
    )]
    async fn send(&self, message: &EmailMessage) -> Result<(), PlatformError> {
        message.check()?;
        let email = self.build_message(message)?;
        let response = self.transport.send(email).await.map_err(|e| smtp_error(&e))?;
        debug!(code = %response.code(), "SMTP relay accepted message");
        Ok(())
    }
}

#[derive(Serialize)]
struct SendGridAddress<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct SendGridPersonalization<'a> {
    to: Vec<SendGridAddress<'a>>,
}

#[derive(Serialize)]
struct SendGridContent<'a> {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: &'a str,
}

#[derive(Serialize)]
struct SendGridMail<'a> {
    personalizations: [SendGridPersonalization<'a>; 1],
    from: SendGridAddress<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<SendGridAddress<'a>>,
    subject: &'a str,
    content: Vec<SendGridContent<'a>>,
}

/// SendGrid v3 mail API client.
#[derive(Debug, Clone)]
pub struct SendGridSender {
    from_address: String,
    api: RemoteApi,
}

impl SendGridSender {
    /// Create a client.
    #[must_use]
    pub fn new(
        http: Client,
        api_key: SecretString,
        from_address: String,
        api_base: Option<&str>,
    ) -> Self {
        Self {
            from_address,
            api: RemoteApi::new(
                http,
                api_base.unwrap_or(SENDGRID_API_BASE),
                ApiAuth::Bearer(api_key),
            ),
        }
    }
}

#[async_trait]
impl EmailSender for SendGridSender {
    fn provider_name(&self) -> &'static str {
        Provider::SendGrid.name()
    }

    #[instrument(
        skip(self, message),
        fields(endpoint = %self.api.base_url(), recipients = message.to.len())
    )]
    async fn send(&self, message: &EmailMessage) -> Result<(), PlatformError> {
        message.check()?;

        let mut content = vec![SendGridContent {
            content_type: "text/plain",
            value: &message.text_body,
        }];
        if let Some(html) = &message.html_body {
            content.push(SendGridContent {
                content_type: "text/html",
                value: html,
            });
        }

        let mail = SendGridMail {
            personalizations: [SendGridPersonalization {
                to: message
                    .to
                    .iter()
                    .map(|email| SendGridAddress { email })
                    .collect(),
            }],
            from: SendGridAddress {
                email: &self.from_address,
            },
            reply_to: message
                .reply_to
                .as_deref()
                .map(|email| SendGridAddress { email }),
            subject: &message.subject,
            content,
        };
        self.api.post_json_accepted("/v3/mail/send", &mail).await
    }
}
