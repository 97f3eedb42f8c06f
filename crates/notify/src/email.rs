//! SMTP email notifier via `lettre`.
//!
//! Each alert goes out as one multipart/alternative message (plain text
//! plus HTML) to every configured recipient.

use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use watchdesk_core::config::SmtpConfig;
use watchdesk_core::Alert;

use crate::templating::{RenderedAlert, TemplateRenderer};
use crate::traits::{Notifier, NotifyError};

/// Sends alerts as emails via SMTP.
#[derive(Debug)]
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
    renderer: TemplateRenderer,
}

fn parse_mailbox(addr: &str) -> Result<Mailbox, NotifyError> {
    addr.trim()
        .parse()
        .map_err(|e: lettre::address::AddressError| NotifyError::Config(format!("{}: {}", addr, e)))
}

impl EmailNotifier {
    /// Build an `EmailNotifier` from SMTP configuration.
    ///
    /// Port 465 uses implicit TLS; other ports use STARTTLS when `tls` is
    /// set and a plain connection otherwise. Credentials come from the
    /// `SMTP_USERNAME` and `SMTP_PASSWORD` environment variables; when
    /// either is missing the connection is unauthenticated.
    pub fn from_config(cfg: &SmtpConfig, renderer: TemplateRenderer) -> Result<Self, NotifyError> {
        let host = cfg
            .host
            .as_deref()
            .ok_or_else(|| NotifyError::Config("SMTP_HOST is not set".to_string()))?;
        let from = cfg
            .from
            .as_deref()
            .ok_or_else(|| NotifyError::Config("EMAIL_SENDER is not set".to_string()))?;
        let from = parse_mailbox(from)?;

        let to = cfg
            .to
            .iter()
            .map(|addr| parse_mailbox(addr))
            .collect::<Result<Vec<_>, _>>()?;
        if to.is_empty() {
            return Err(NotifyError::Config(
                "at least one recipient is required".to_string(),
            ));
        }

        let mut builder = if cfg.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(cfg.port)
        } else if cfg.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(cfg.port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(cfg.port)
        };

        if let (Ok(username), Ok(password)) =
            (std::env::var("SMTP_USERNAME"), std::env::var("SMTP_PASSWORD"))
        {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
            renderer,
        })
    }

    pub fn recipients(&self) -> usize {
        self.to.len()
    }

    fn build_message(&self, rendered: RenderedAlert) -> Result<Message, NotifyError> {
        let mut builder = Message::builder().from(self.from.clone());
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }
        builder
            .subject(rendered.subject)
            .multipart(MultiPart::alternative_plain_html(rendered.text, rendered.html))
            .map_err(|e| NotifyError::Smtp(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let rendered = self.renderer.render(alert)?;
        let subject = rendered.subject.clone();
        let email = self.build_message(rendered)?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(
            channel = "email",
            entity = %alert.subject.id,
            subject = %subject,
            recipients = self.to.len(),
            "alert email delivered"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}
