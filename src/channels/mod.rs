//! Channel dispatcher: fans a rendered message out across the configured
//! channel ids, each id evaluated independently so one broken transport
//! never blocks the others.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::settings::{ChannelId, MessagingSettings};

pub mod email;
pub mod traits;
pub mod whatsapp_api;
pub mod whatsapp_web;

pub use traits::{Channel, ChannelError, ChannelKind, DispatchReceipt, DispatchRequest};

use email::EmailChannel;
use whatsapp_api::WhatsAppApiChannel;
use whatsapp_web::WhatsAppWebChannel;

/// Per-channel result of one fan-out pass. Success and failure are reported
/// side by side; callers decide what a partial failure means.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub channel: ChannelId,
    pub correlation_id: String,
    pub result: Result<DispatchReceipt, ChannelError>,
}

impl DispatchOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Contact endpoints for one recipient, keyed by channel id.
#[derive(Debug, Clone, Default)]
pub struct Recipients {
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl Recipients {
    pub fn for_channel(&self, channel: ChannelId) -> Option<&str> {
        match channel {
            ChannelId::WhatsApp => self.phone.as_deref(),
            ChannelId::Email => self.email.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.phone.is_none() && self.email.is_none()
    }
}

/// Representative transport kind for errors raised before any variant was
/// consulted, keyed by the channel id that was asked for.
fn fallback_kind(channel: ChannelId) -> ChannelKind {
    match channel {
        ChannelId::WhatsApp => ChannelKind::WhatsAppWeb,
        ChannelId::Email => ChannelKind::Email,
    }
}

/// The registered transport variants. Registry order within a channel id is
/// preference order: for `whatsapp` the API variant is tried first and the
/// Web deep link is the fallback.
pub struct ChannelSet {
    channels: Vec<Arc<dyn Channel>>,
}

impl ChannelSet {
    pub fn standard(channel_timeout: Duration) -> Self {
        Self::new(vec![
            Arc::new(WhatsAppApiChannel::new(channel_timeout)),
            Arc::new(WhatsAppWebChannel),
            Arc::new(EmailChannel::new(channel_timeout)),
        ])
    }

    pub fn new(channels: Vec<Arc<dyn Channel>>) -> Self {
        Self { channels }
    }

    fn variants_for(&self, channel: ChannelId) -> impl Iterator<Item = &Arc<dyn Channel>> {
        self.channels.iter().filter(move |c| c.kind().id() == channel)
    }

    /// Send one message on one channel id, walking its variants in
    /// preference order until one succeeds.
    pub async fn dispatch(
        &self,
        settings: &MessagingSettings,
        channel: ChannelId,
        recipient: &str,
        message: &str,
        subject: Option<&str>,
        correlation_id: &str,
    ) -> DispatchOutcome {
        let request = DispatchRequest {
            channel,
            recipient: recipient.to_string(),
            message: message.to_string(),
            subject: subject.map(str::to_string),
            correlation_id: correlation_id.to_string(),
        };

        let mut last_error = ChannelError::Misconfigured {
            channel: fallback_kind(channel),
            reason: format!("no transport variant registered for channel '{channel}'"),
        };
        let mut attempted = false;

        for variant in self.variants_for(channel) {
            attempted = true;
            if let Err(e) = variant.readiness(settings) {
                debug!(variant = %variant.kind(), "variant not dispatchable: {e}");
                last_error = e;
                continue;
            }
            match variant.deliver(&request, settings).await {
                Ok(receipt) => {
                    info!(
                        variant = %variant.kind(),
                        correlation_id,
                        "message dispatched"
                    );
                    return DispatchOutcome {
                        channel,
                        correlation_id: request.correlation_id,
                        result: Ok(receipt),
                    };
                }
                Err(e) => {
                    warn!(variant = %variant.kind(), correlation_id, "delivery failed: {e}");
                    last_error = e;
                }
            }
        }

        if attempted {
            warn!(%channel, correlation_id, "all variants failed: {last_error}");
        }
        DispatchOutcome {
            channel,
            correlation_id: request.correlation_id,
            result: Err(last_error),
        }
    }

    /// Fan out across channel ids. One outcome per id, failures included;
    /// an id without a contact endpoint reports a failure rather than
    /// silently vanishing.
    pub async fn dispatch_all(
        &self,
        settings: &MessagingSettings,
        channel_ids: &[ChannelId],
        recipients: &Recipients,
        message: &str,
        subject: Option<&str>,
        correlation_id: &str,
    ) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::with_capacity(channel_ids.len());
        for &channel in channel_ids {
            let Some(recipient) = recipients.for_channel(channel) else {
                warn!(%channel, correlation_id, "no recipient for channel, skipping");
                outcomes.push(DispatchOutcome {
                    channel,
                    correlation_id: correlation_id.to_string(),
                    result: Err(ChannelError::TransportFailure {
                        channel: fallback_kind(channel),
                        message: "recipient has no endpoint for this channel".into(),
                    }),
                });
                continue;
            };
            outcomes.push(
                self.dispatch(settings, channel, recipient, message, subject, correlation_id)
                    .await,
            );
        }
        outcomes
    }

    /// Operator "send me a test message" path. Goes through the exact same
    /// dispatch code as production sends, so a disabled or misconfigured
    /// channel fails the same way it would for a customer message.
    pub async fn test_send(
        &self,
        settings: &MessagingSettings,
        channel: ChannelId,
        recipient: &str,
    ) -> DispatchOutcome {
        let correlation_id = format!("test:{}", Uuid::new_v4());
        let message = "رسالة تجريبية من FixFlow للتأكد من إعدادات المراسلة ✅";
        self.dispatch(settings, channel, recipient, message, None, &correlation_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    struct ScriptedChannel {
        kind: ChannelKind,
        ready: Result<(), fn(ChannelKind) -> ChannelError>,
        fail_delivery: bool,
        delivered: Mutex<Vec<String>>,
    }

    impl ScriptedChannel {
        fn ok(kind: ChannelKind) -> Self {
            Self {
                kind,
                ready: Ok(()),
                fail_delivery: false,
                delivered: Mutex::new(Vec::new()),
            }
        }

        fn rejecting(kind: ChannelKind) -> Self {
            Self {
                ready: Err(ChannelError::Disabled),
                ..Self::ok(kind)
            }
        }

        fn failing(kind: ChannelKind) -> Self {
            Self {
                fail_delivery: true,
                ..Self::ok(kind)
            }
        }
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        fn readiness(&self, _settings: &MessagingSettings) -> Result<(), ChannelError> {
            self.ready.map_err(|make| make(self.kind))
        }

        async fn deliver(
            &self,
            request: &DispatchRequest,
            settings: &MessagingSettings,
        ) -> Result<DispatchReceipt, ChannelError> {
            self.readiness(settings)?;
            if self.fail_delivery {
                return Err(ChannelError::TransportFailure {
                    channel: self.kind,
                    message: "scripted failure".into(),
                });
            }
            self.delivered.lock().push(request.correlation_id.clone());
            Ok(DispatchReceipt {
                channel: self.kind,
                message_id: None,
                web_link: None,
                sent_at: Utc::now(),
            })
        }
    }

    fn recipients() -> Recipients {
        Recipients {
            phone: Some("+201001234567".into()),
            email: Some("a@b.example".into()),
        }
    }

    #[tokio::test]
    async fn api_variant_preferred_when_dispatchable() {
        let api = Arc::new(ScriptedChannel::ok(ChannelKind::WhatsAppApi));
        let web = Arc::new(ScriptedChannel::ok(ChannelKind::WhatsAppWeb));
        let set = ChannelSet::new(vec![api.clone(), web.clone()]);

        let outcome = set
            .dispatch(
                &MessagingSettings::default(),
                ChannelId::WhatsApp,
                "+201001234567",
                "مرحباً",
                None,
                "invoice:1:created",
            )
            .await;

        assert!(outcome.succeeded());
        assert_eq!(api.delivered.lock().len(), 1);
        assert!(web.delivered.lock().is_empty());
    }

    #[tokio::test]
    async fn web_variant_takes_over_when_api_rejects() {
        let api = Arc::new(ScriptedChannel::rejecting(ChannelKind::WhatsAppApi));
        let web = Arc::new(ScriptedChannel::ok(ChannelKind::WhatsAppWeb));
        let set = ChannelSet::new(vec![api, web.clone()]);

        let outcome = set
            .dispatch(
                &MessagingSettings::default(),
                ChannelId::WhatsApp,
                "+201001234567",
                "مرحباً",
                None,
                "invoice:1:created",
            )
            .await;

        assert!(outcome.succeeded());
        assert_eq!(web.delivered.lock().len(), 1);
    }

    #[tokio::test]
    async fn web_variant_takes_over_when_api_delivery_fails() {
        let api = Arc::new(ScriptedChannel::failing(ChannelKind::WhatsAppApi));
        let web = Arc::new(ScriptedChannel::ok(ChannelKind::WhatsAppWeb));
        let set = ChannelSet::new(vec![api, web.clone()]);

        let outcome = set
            .dispatch(
                &MessagingSettings::default(),
                ChannelId::WhatsApp,
                "+201001234567",
                "مرحباً",
                None,
                "invoice:1:created",
            )
            .await;

        assert!(outcome.succeeded());
        assert_eq!(web.delivered.lock().len(), 1);
    }

    #[tokio::test]
    async fn fan_out_reports_each_channel_independently() {
        let whatsapp = Arc::new(ScriptedChannel::ok(ChannelKind::WhatsAppWeb));
        let email = Arc::new(ScriptedChannel::failing(ChannelKind::Email));
        let set = ChannelSet::new(vec![whatsapp.clone(), email]);

        let outcomes = set
            .dispatch_all(
                &MessagingSettings::default(),
                &[ChannelId::WhatsApp, ChannelId::Email],
                &recipients(),
                "مرحباً",
                None,
                "invoice:1:created",
            )
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].succeeded());
        assert!(!outcomes[1].succeeded());
        // the whatsapp send still went out despite the email failure
        assert_eq!(whatsapp.delivered.lock().len(), 1);
    }

    #[tokio::test]
    async fn missing_endpoint_is_a_reported_failure() {
        let set = ChannelSet::new(vec![Arc::new(ScriptedChannel::ok(ChannelKind::Email))]);
        let only_phone = Recipients {
            phone: Some("+2010".into()),
            email: None,
        };

        let outcomes = set
            .dispatch_all(
                &MessagingSettings::default(),
                &[ChannelId::Email],
                &only_phone,
                "x",
                None,
                "invoice:1:created",
            )
            .await;

        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].succeeded());
    }

    #[tokio::test]
    async fn unregistered_channel_error_names_the_requested_channel() {
        // only a whatsapp variant registered, email requested
        let set = ChannelSet::new(vec![Arc::new(ScriptedChannel::ok(ChannelKind::WhatsAppWeb))]);

        let outcome = set
            .dispatch(
                &MessagingSettings::default(),
                ChannelId::Email,
                "a@b.example",
                "x",
                None,
                "invoice:1:created",
            )
            .await;

        match outcome.result {
            Err(ChannelError::Misconfigured { channel, .. }) => {
                assert_eq!(channel, ChannelKind::Email);
            }
            other => panic!("expected a misconfigured error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_fails_like_production_on_disabled_channel() {
        let set = ChannelSet::standard(Duration::from_secs(5));
        let mut settings = MessagingSettings::default();
        settings.whatsapp.enabled = false;

        let outcome = set
            .test_send(&settings, ChannelId::WhatsApp, "+201001234567")
            .await;
        assert!(matches!(outcome.result, Err(ChannelError::Disabled(_))));
    }

    #[tokio::test]
    async fn test_send_uses_the_production_path() {
        let set = ChannelSet::standard(Duration::from_secs(5));
        let settings = MessagingSettings::default(); // web enabled by default

        let outcome = set
            .test_send(&settings, ChannelId::WhatsApp, "+20 100 123 4567")
            .await;
        let receipt = outcome.result.unwrap();
        assert_eq!(receipt.channel, ChannelKind::WhatsAppWeb);
        assert!(receipt.web_link.unwrap().contains("phone=201001234567"));
    }
}
