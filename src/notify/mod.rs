//! Outbound notifications
//!
//! SMS goes through a Twilio-compatible REST API, email through SMTP.
//! Either channel may be unconfigured; the disabled senders log and report
//! `NotConfigured` instead of failing start-up.

use async_trait::async_trait;
use std::sync::Arc;

mod email;
mod notifier;
mod sms;

pub use email::{DisabledEmail, SmtpEmail};
pub use notifier::{DeliveryReport, Notifier, NotifyChannels};
pub use sms::{DisabledSms, TwilioSms};

use crate::config::{EmailConfig, SmsConfig};

/// Error types for notification delivery
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

/// Provider acknowledgement of a text message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmsReceipt {
    /// Provider message id, when one was returned
    pub sid: Option<String>,
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<SmsReceipt, NotifyError>;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Configured SMS sender, or the disabled one when credentials are missing
pub fn create_sms_sender(config: &SmsConfig) -> Arc<dyn SmsSender> {
    if !config.is_configured() {
        tracing::info!("SMS credentials missing, text messages are disabled");
        return Arc::new(DisabledSms);
    }
    match TwilioSms::from_config(config) {
        Ok(sender) => Arc::new(sender),
        Err(e) => {
            tracing::warn!("Failed to create SMS sender: {}", e);
            Arc::new(DisabledSms)
        }
    }
}

/// Configured email sender, or the disabled one when no SMTP host is set
pub fn create_email_sender(config: &EmailConfig) -> Arc<dyn EmailSender> {
    if !config.is_configured() {
        tracing::info!("SMTP host missing, email is disabled");
        return Arc::new(DisabledEmail);
    }
    match SmtpEmail::from_config(config) {
        Ok(sender) => Arc::new(sender),
        Err(e) => {
            tracing::warn!("Failed to create email sender: {}", e);
            Arc::new(DisabledEmail)
        }
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Records every text; numbers in `failing` are rejected
    #[derive(Default)]
    pub struct RecordingSms {
        sent: Mutex<Vec<(String, String)>>,
        failing: Vec<String>,
    }

    impl RecordingSms {
        pub fn failing_for(numbers: &[&str]) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failing: numbers.iter().map(|n| n.to_string()).collect(),
            }
        }

        pub fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SmsSender for RecordingSms {
        async fn send(&self, to: &str, body: &str) -> Result<SmsReceipt, NotifyError> {
            if self.failing.iter().any(|n| n == to) {
                return Err(NotifyError::Provider {
                    status: 400,
                    body: "scripted failure".to_string(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), body.to_string()));
            Ok(SmsReceipt {
                sid: Some(format!("SM{}", self.sent.lock().unwrap().len())),
            })
        }
    }

    /// Records every email as (to, subject, body)
    #[derive(Default)]
    pub struct RecordingEmail {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    impl RecordingEmail {
        pub fn sent(&self) -> Vec<(String, String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmailSender for RecordingEmail {
        async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }
}
