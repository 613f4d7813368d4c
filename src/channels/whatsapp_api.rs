//! WhatsApp Business API variant: bearer-token POST to the configured
//! gateway. Preferred over the Web variant when configured.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::time::Duration;

use super::traits::{Channel, ChannelError, ChannelKind, DispatchReceipt, DispatchRequest};
use super::whatsapp_web::strip_non_digits;
use crate::settings::MessagingSettings;

pub struct WhatsAppApiChannel {
    client: reqwest::Client,
    timeout: Duration,
}

impl WhatsAppApiChannel {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            timeout,
        }
    }
}

#[async_trait]
impl Channel for WhatsAppApiChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::WhatsAppApi
    }

    fn readiness(&self, settings: &MessagingSettings) -> Result<(), ChannelError> {
        let whatsapp = &settings.whatsapp;
        if !whatsapp.enabled || !whatsapp.api_enabled {
            return Err(ChannelError::Disabled(self.kind()));
        }
        if whatsapp.api_url.trim().is_empty() {
            return Err(ChannelError::Misconfigured {
                channel: self.kind(),
                reason: "apiUrl is empty".into(),
            });
        }
        if whatsapp.api_token.trim().is_empty() {
            return Err(ChannelError::Misconfigured {
                channel: self.kind(),
                reason: "apiToken is empty".into(),
            });
        }
        Ok(())
    }

    async fn deliver(
        &self,
        request: &DispatchRequest,
        settings: &MessagingSettings,
    ) -> Result<DispatchReceipt, ChannelError> {
        self.readiness(settings)?;

        let phone = strip_non_digits(&request.recipient);
        if phone.is_empty() {
            return Err(ChannelError::TransportFailure {
                channel: self.kind(),
                message: format!("recipient '{}' has no digits", request.recipient),
            });
        }

        let body = json!({
            "phone": phone,
            "message": request.message,
        });

        let response = self
            .client
            .post(&settings.whatsapp.api_url)
            .bearer_auth(&settings.whatsapp.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChannelError::Timeout {
                        channel: self.kind(),
                        seconds: self.timeout.as_secs(),
                    }
                } else {
                    ChannelError::TransportFailure {
                        channel: self.kind(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ChannelError::TransportFailure {
                channel: self.kind(),
                message: format!("gateway returned {status}: {detail}"),
            });
        }

        // Gateways differ on the id field; take whichever is present.
        let message_id = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| {
                v.get("messageId")
                    .or_else(|| v.get("id"))
                    .and_then(|id| id.as_str().map(str::to_string))
            });

        Ok(DispatchReceipt {
            channel: self.kind(),
            message_id,
            web_link: None,
            sent_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_settings(url: &str, token: &str) -> MessagingSettings {
        let mut settings = MessagingSettings::default();
        settings.whatsapp.api_enabled = true;
        settings.whatsapp.api_url = url.into();
        settings.whatsapp.api_token = token.into();
        settings
    }

    #[test]
    fn disabled_by_default() {
        let channel = WhatsAppApiChannel::new(Duration::from_secs(5));
        let err = channel.readiness(&MessagingSettings::default()).unwrap_err();
        assert!(matches!(err, ChannelError::Disabled(ChannelKind::WhatsAppApi)));
    }

    #[test]
    fn blank_url_or_token_is_misconfigured() {
        let channel = WhatsAppApiChannel::new(Duration::from_secs(5));

        let err = channel.readiness(&api_settings("", "tok")).unwrap_err();
        assert!(matches!(err, ChannelError::Misconfigured { .. }), "got {err:?}");

        let err = channel
            .readiness(&api_settings("https://wa.example/send", "  "))
            .unwrap_err();
        assert!(matches!(err, ChannelError::Misconfigured { .. }), "got {err:?}");
    }

    #[test]
    fn configured_gateway_passes_readiness() {
        let channel = WhatsAppApiChannel::new(Duration::from_secs(5));
        let settings = api_settings("https://wa.example/send", "secret-token");
        assert!(channel.readiness(&settings).is_ok());
    }

    #[tokio::test]
    async fn digitless_recipient_fails_before_any_request() {
        let channel = WhatsAppApiChannel::new(Duration::from_secs(5));
        let settings = api_settings("https://wa.example/send", "secret-token");
        let request = DispatchRequest {
            channel: crate::settings::ChannelId::WhatsApp,
            recipient: "n/a".into(),
            message: "x".into(),
            subject: None,
            correlation_id: "test:1:created".into(),
        };
        let err = channel.deliver(&request, &settings).await.unwrap_err();
        assert!(matches!(err, ChannelError::TransportFailure { .. }));
    }
}
