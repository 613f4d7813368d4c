use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

use crate::settings::{ChannelId, MessagingSettings};

/// Concrete transport variant behind a channel id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    WhatsAppWeb,
    WhatsAppApi,
    Email,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WhatsAppWeb => "whatsapp-web",
            Self::WhatsAppApi => "whatsapp-api",
            Self::Email => "email",
        }
    }

    /// The settings-document channel id this variant serves.
    pub fn id(self) -> ChannelId {
        match self {
            Self::WhatsAppWeb | Self::WhatsAppApi => ChannelId::WhatsApp,
            Self::Email => ChannelId::Email,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel {0} is disabled in settings")]
    Disabled(ChannelKind),
    #[error("channel {channel} is misconfigured: {reason}")]
    Misconfigured { channel: ChannelKind, reason: String },
    #[error("channel {channel} timed out after {seconds}s")]
    Timeout { channel: ChannelKind, seconds: u64 },
    #[error("channel {channel} transport failure: {message}")]
    TransportFailure { channel: ChannelKind, message: String },
}

/// One message for one recipient on one channel id. Building a request has
/// no side effects; nothing leaves the process until `deliver` runs.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub channel: ChannelId,
    pub recipient: String,
    pub message: String,
    pub subject: Option<String>,
    pub correlation_id: String,
}

#[derive(Debug, Clone)]
pub struct DispatchReceipt {
    pub channel: ChannelKind,
    /// Transport-assigned id, when the transport reports one.
    pub message_id: Option<String>,
    /// Deep link for the host UI to open (WhatsApp Web variant).
    pub web_link: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// A transport variant. `readiness` is the cheap typed gate; `deliver`
/// performs the actual send.
#[async_trait]
pub trait Channel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Fast rejection before any IO: `Disabled` when switched off in
    /// settings, `Misconfigured` when required settings are blank.
    fn readiness(&self, settings: &MessagingSettings) -> Result<(), ChannelError>;

    async fn deliver(
        &self,
        request: &DispatchRequest,
        settings: &MessagingSettings,
    ) -> Result<DispatchReceipt, ChannelError>;
}
