//! Email over SMTP

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{EmailSender, NotifyError};
use crate::config::EmailConfig;

pub struct SmtpEmail {
    from: Mailbox,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmail {
    pub fn from_config(config: &EmailConfig) -> Result<Self, NotifyError> {
        let host = config
            .smtp_host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(NotifyError::NotConfigured("Email"))?;

        let from = format!("{} <{}>", config.from_name, config.from_address)
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::Smtp(format!("Invalid from address: {}", e)))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| NotifyError::Smtp(format!("Failed to create SMTP transport: {}", e)))?
            .port(config.smtp_port);
        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            from,
            mailer: builder.build(),
        })
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> Result<Message, NotifyError> {
        let to = to
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::InvalidRecipient(format!("{}: {}", to, e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| NotifyError::Smtp(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl EmailSender for SmtpEmail {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let email = self.build_message(to, subject, body)?;
        self.mailer
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(format!("Failed to send email: {}", e)))?;
        tracing::info!("Email sent to {}", to);
        Ok(())
    }
}

/// Stand-in used when no SMTP host is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledEmail;

#[async_trait]
impl EmailSender for DisabledEmail {
    async fn send(&self, to: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
        tracing::info!("Email disabled, not emailing {}", to);
        Err(NotifyError::NotConfigured("Email"))
    }
}
