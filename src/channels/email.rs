//! Email variant: SMTP via lettre, STARTTLS, creds from the settings
//! document. The blocking transport runs under `spawn_blocking` with a
//! timeout so a stuck SMTP server cannot stall a dispatch pass.

use async_trait::async_trait;
use chrono::Utc;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::time::Duration;

use super::traits::{Channel, ChannelError, ChannelKind, DispatchReceipt, DispatchRequest};
use crate::settings::MessagingSettings;

pub struct EmailChannel {
    timeout: Duration,
}

impl EmailChannel {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn sender_mailbox(&self, settings: &MessagingSettings) -> Result<Mailbox, ChannelError> {
        let email = &settings.email;
        let formatted = if email.from_name.trim().is_empty() {
            email.from_email.clone()
        } else {
            format!("{} <{}>", email.from_name, email.from_email)
        };
        formatted.parse().map_err(|e| ChannelError::Misconfigured {
            channel: self.kind(),
            reason: format!("fromEmail '{}' is not a valid address: {e}", email.from_email),
        })
    }
}

#[async_trait]
impl Channel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn readiness(&self, settings: &MessagingSettings) -> Result<(), ChannelError> {
        let email = &settings.email;
        if !email.enabled {
            return Err(ChannelError::Disabled(self.kind()));
        }
        if email.smtp_host.trim().is_empty() {
            return Err(ChannelError::Misconfigured {
                channel: self.kind(),
                reason: "smtpHost is empty".into(),
            });
        }
        if email.from_email.trim().is_empty() {
            return Err(ChannelError::Misconfigured {
                channel: self.kind(),
                reason: "fromEmail is empty".into(),
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

        if !request.recipient.contains('@') {
            return Err(ChannelError::TransportFailure {
                channel: self.kind(),
                message: format!("recipient '{}' is not an email address", request.recipient),
            });
        }
        let to: Mailbox =
            request
                .recipient
                .parse()
                .map_err(|e| ChannelError::TransportFailure {
                    channel: self.kind(),
                    message: format!("recipient '{}' rejected: {e}", request.recipient),
                })?;

        let subject = request
            .subject
            .clone()
            .unwrap_or_else(|| settings.email.default_subject.clone());

        let message = Message::builder()
            .from(self.sender_mailbox(settings)?)
            .to(to)
            .subject(subject)
            .body(request.message.clone())
            .map_err(|e| ChannelError::TransportFailure {
                channel: self.kind(),
                message: format!("failed to build message: {e}"),
            })?;

        let email = &settings.email;
        let mut builder = SmtpTransport::starttls_relay(&email.smtp_host)
            .map_err(|e| ChannelError::Misconfigured {
                channel: self.kind(),
                reason: format!("smtpHost '{}' rejected: {e}", email.smtp_host),
            })?
            .port(email.smtp_port);
        if !email.smtp_user.is_empty() {
            builder = builder.credentials(Credentials::new(
                email.smtp_user.clone(),
                email.smtp_password.clone(),
            ));
        }
        let transport = builder.build();

        let send = tokio::task::spawn_blocking(move || transport.send(&message));
        let outcome = tokio::time::timeout(self.timeout, send).await;

        match outcome {
            Err(_) => Err(ChannelError::Timeout {
                channel: self.kind(),
                seconds: self.timeout.as_secs(),
            }),
            Ok(Err(join_err)) => Err(ChannelError::TransportFailure {
                channel: self.kind(),
                message: format!("smtp task failed: {join_err}"),
            }),
            Ok(Ok(Err(smtp_err))) => Err(ChannelError::TransportFailure {
                channel: self.kind(),
                message: smtp_err.to_string(),
            }),
            Ok(Ok(Ok(response))) => Ok(DispatchReceipt {
                channel: self.kind(),
                message_id: response.message().next().map(str::to_string),
                web_link: None,
                sent_at: Utc::now(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp_settings() -> MessagingSettings {
        let mut settings = MessagingSettings::default();
        settings.email.enabled = true;
        settings.email.smtp_host = "smtp.example.com".into();
        settings.email.from_email = "billing@fixflow.example".into();
        settings
    }

    #[test]
    fn disabled_by_default() {
        let channel = EmailChannel::new(Duration::from_secs(5));
        let err = channel.readiness(&MessagingSettings::default()).unwrap_err();
        assert!(matches!(err, ChannelError::Disabled(ChannelKind::Email)));
    }

    #[test]
    fn enabled_without_host_is_misconfigured() {
        let channel = EmailChannel::new(Duration::from_secs(5));
        let mut settings = MessagingSettings::default();
        settings.email.enabled = true;
        let err = channel.readiness(&settings).unwrap_err();
        assert!(matches!(err, ChannelError::Misconfigured { .. }));
    }

    #[test]
    fn configured_smtp_passes_readiness() {
        let channel = EmailChannel::new(Duration::from_secs(5));
        assert!(channel.readiness(&smtp_settings()).is_ok());
    }

    #[test]
    fn sender_mailbox_includes_display_name() {
        let channel = EmailChannel::new(Duration::from_secs(5));
        let mailbox = channel.sender_mailbox(&smtp_settings()).unwrap();
        assert_eq!(mailbox.email.to_string(), "billing@fixflow.example");
    }

    #[tokio::test]
    async fn non_email_recipient_is_rejected() {
        let channel = EmailChannel::new(Duration::from_secs(5));
        let request = DispatchRequest {
            channel: crate::settings::ChannelId::Email,
            recipient: "+201001234567".into(),
            message: "x".into(),
            subject: None,
            correlation_id: "test:1:created".into(),
        };
        let err = channel.deliver(&request, &smtp_settings()).await.unwrap_err();
        assert!(matches!(err, ChannelError::TransportFailure { .. }));
    }
}
