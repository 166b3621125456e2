//! SMS over the Twilio Messages API

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{NotifyError, SmsReceipt, SmsSender};
use crate::config::SmsConfig;

const REQUEST_TIMEOUT_SECS: u64 = 15;

pub struct TwilioSms {
    account_sid: String,
    auth_token: String,
    from_number: String,
    api_base: String,
    http: Client,
}

impl TwilioSms {
    pub fn from_config(config: &SmsConfig) -> Result<Self, NotifyError> {
        let credential = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or(NotifyError::NotConfigured("SMS"))
        };

        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            account_sid: credential(&config.account_sid)?,
            auth_token: credential(&config.auth_token)?,
            from_number: credential(&config.from_number)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        )
    }
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    #[serde(default)]
    sid: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[async_trait]
impl SmsSender for TwilioSms {
    async fn send(&self, to: &str, body: &str) -> Result<SmsReceipt, NotifyError> {
        if to.trim().is_empty() {
            return Err(NotifyError::InvalidRecipient("empty phone number".to_string()));
        }

        let params = [("To", to), ("From", self.from_number.as_str()), ("Body", body)];
        let response = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let resource: MessageResource = response.json().await?;
        tracing::info!(
            "SMS sent: SID={}, Status={}",
            resource.sid.as_deref().unwrap_or("-"),
            resource.status.as_deref().unwrap_or("-")
        );
        Ok(SmsReceipt { sid: resource.sid })
    }
}

/// Stand-in used when SMS credentials are missing
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSms;

#[async_trait]
impl SmsSender for DisabledSms {
    async fn send(&self, to: &str, _body: &str) -> Result<SmsReceipt, NotifyError> {
        tracing::info!("SMS disabled, not texting {}", to);
        Err(NotifyError::NotConfigured("SMS"))
    }
}
