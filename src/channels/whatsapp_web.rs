//! WhatsApp Web variant: no network IO, the send is a deep link the host UI
//! opens in the operator's browser session.

use async_trait::async_trait;
use chrono::Utc;

use super::traits::{Channel, ChannelError, ChannelKind, DispatchReceipt, DispatchRequest};
use crate::settings::MessagingSettings;

const WEB_SEND_BASE: &str = "https://web.whatsapp.com/send";

/// Keep digits only. WhatsApp deep links reject '+', spaces and dashes.
pub fn strip_non_digits(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

pub struct WhatsAppWebChannel;

impl WhatsAppWebChannel {
    pub fn deep_link(phone: &str, message: &str) -> String {
        format!(
            "{WEB_SEND_BASE}?phone={}&text={}",
            strip_non_digits(phone),
            urlencoding::encode(message)
        )
    }
}

#[async_trait]
impl Channel for WhatsAppWebChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::WhatsAppWeb
    }

    fn readiness(&self, settings: &MessagingSettings) -> Result<(), ChannelError> {
        if !settings.whatsapp.enabled || !settings.whatsapp.web_enabled {
            return Err(ChannelError::Disabled(self.kind()));
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

        Ok(DispatchReceipt {
            channel: self.kind(),
            message_id: None,
            web_link: Some(Self::deep_link(&request.recipient, &request.message)),
            sent_at: Utc::now(),
        })
    }
}
