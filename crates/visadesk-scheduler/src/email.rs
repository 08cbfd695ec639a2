//! Outgoing e-mail for reminders via SMTP (async lettre) or an HTTP relay.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use visadesk_core::config::{EmailApiConfig, SmtpConfig, VisaDeskConfig};
use visadesk_core::error::{Result, VisaDeskError};

/// Anything that can deliver an HTML e-mail.
#[async_trait]
pub trait EmailSender: Send + Sync {
    fn name(&self) -> &str;

    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> Result<()>;
}

/// Pick a sender from config: SMTP, then the HTTP relay, else log only.
pub fn sender_from_config(config: &VisaDeskConfig) -> Arc<dyn EmailSender> {
    if let Some(smtp) = &config.smtp
        && smtp.enabled
        && !smtp.host.is_empty()
    {
        tracing::info!("📧 Reminder e-mail via SMTP {}:{}", smtp.host, smtp.port);
        return Arc::new(SmtpMailer::new(smtp.clone()));
    }
    if let Some(api) = &config.email_api
        && !api.url.is_empty()
    {
        tracing::info!("📧 Reminder e-mail via HTTP relay {}", api.url);
        return Arc::new(HttpMailer::new(api.clone()));
    }
    tracing::warn!("⚠️ No mail transport configured; reminders will only be logged");
    Arc::new(LogMailer)
}

/// SMTP sender (STARTTLS relay with credentials).
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EmailSender for SmtpMailer {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        use lettre::{
            AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, message::Mailbox,
            message::header::ContentType, transport::smtp::authentication::Credentials,
        };

        let from_name = self.config.from_name.as_deref().unwrap_or("VisaDesk");
        let from_mailbox: Mailbox = format!("{from_name} <{}>", self.config.from_email)
            .parse()
            .map_err(|e| VisaDeskError::Email(format!("Invalid from: {e}")))?;

        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| VisaDeskError::Email(format!("Invalid to: {e}")))?;

        let email = LettreMessage::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| VisaDeskError::Email(format!("Build email: {e}")))?;

        let mut transport =
            AsyncSmtpTransport::<lettre::Tokio1Executor>::starttls_relay(&self.config.host)
                .map_err(|e| VisaDeskError::Email(format!("SMTP relay: {e}")))?
                .port(self.config.port);
        if !self.config.username.is_empty() {
            transport = transport.credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ));
        }

        transport
            .build()
            .send(email)
            .await
            .map_err(|e| VisaDeskError::Email(format!("SMTP send: {e}")))?;

        tracing::info!("📤 Email sent to: {to}");
        Ok(())
    }
}

#[derive(Serialize)]
struct EmailPayload<'a> {
    from_alias: &'a str,
    to_addr: &'a str,
    subject: &'a str,
    html_body: &'a str,
}

/// HTTP relay sender. POSTs the message as JSON with a bearer key.
pub struct HttpMailer {
    client: reqwest::Client,
    config: EmailApiConfig,
}

impl HttpMailer {
    pub fn new(config: EmailApiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl EmailSender for HttpMailer {
    fn name(&self) -> &str {
        "http"
    }

    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        let payload = EmailPayload {
            from_alias: &self.config.from_alias,
            to_addr: to,
            subject,
            html_body,
        };

        let resp = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .timeout(std::time::Duration::from_secs(15))
            .send()
            .await
            .map_err(|e| VisaDeskError::Email(format!("Email relay connection error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(VisaDeskError::Email(format!(
                "Email relay error {status}: {body}"
            )));
        }

        tracing::info!("📤 Email relayed to: {to}");
        Ok(())
    }
}

/// Fallback sender that only writes the message to the log.
pub struct LogMailer;

#[async_trait]
impl EmailSender for LogMailer {
    fn name(&self) -> &str {
        "log"
    }

    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        tracing::info!("📭 [log mailer] to={to} subject={subject:?} ({} bytes)", html_body.len());
        tracing::debug!("{html_body}");
        Ok(())
    }
}
