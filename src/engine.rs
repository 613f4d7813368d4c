//! The host-facing facade: wire the settings store, channels, notifier and
//! reminder scheduler together and expose the four entry points the ERP
//! calls (`on_event`, `tick`, `update_settings`, `test_send`).

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::channels::{ChannelSet, DispatchOutcome};
use crate::events::NotificationEvent;
use crate::notifier::Notifier;
use crate::reminder::{Clock, ReminderLedger, ReminderScheduler, SystemClock, TickReport};
use crate::settings::{ChannelId, MessagingSettings, SettingsError, SettingsRepository, SettingsStore};
use crate::store::InvoiceStore;

/// Deployment knobs owned by the host process, not by the settings
/// document. Typically sourced from the host's environment.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Base URL customer-facing links are built against.
    pub frontend_url: String,
    /// Shop pickup address injected as the `{location}` variable default.
    pub company_address: String,
    pub channel_timeout: Duration,
    pub dispatch_concurrency: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".to_string(),
            company_address: "الفرع الرئيسي".to_string(),
            channel_timeout: Duration::from_secs(15),
            dispatch_concurrency: 8,
        }
    }
}

pub struct NotificationEngine {
    settings: Arc<SettingsStore>,
    channels: Arc<ChannelSet>,
    notifier: Notifier,
    scheduler: ReminderScheduler,
}

impl NotificationEngine {
    pub fn new(
        repository: Arc<dyn SettingsRepository>,
        invoices: Arc<dyn InvoiceStore>,
        ledger: Arc<dyn ReminderLedger>,
        options: EngineOptions,
    ) -> Result<Self, SettingsError> {
        Self::with_clock(repository, invoices, ledger, Arc::new(SystemClock), options)
    }

    /// Like `new` but with an injected time source, for tests and replay.
    pub fn with_clock(
        repository: Arc<dyn SettingsRepository>,
        invoices: Arc<dyn InvoiceStore>,
        ledger: Arc<dyn ReminderLedger>,
        clock: Arc<dyn Clock>,
        options: EngineOptions,
    ) -> Result<Self, SettingsError> {
        let settings = Arc::new(SettingsStore::load(repository)?);
        let channels = Arc::new(ChannelSet::standard(options.channel_timeout));
        let notifier = Notifier::new(settings.clone(), channels.clone(), options.clone());
        let scheduler = ReminderScheduler::new(
            settings.clone(),
            invoices,
            ledger,
            channels.clone(),
            clock,
            options,
        );
        Ok(Self {
            settings,
            channels,
            notifier,
            scheduler,
        })
    }

    /// React to one entity lifecycle event.
    pub async fn on_event(&self, event: &NotificationEvent) -> Vec<DispatchOutcome> {
        self.notifier.on_event(event).await
    }

    /// One reminder scheduler pass. The host calls this on a timer.
    pub async fn tick(&self) -> TickReport {
        self.scheduler.tick().await
    }

    /// Merge, validate, persist and activate a (possibly partial) settings
    /// document.
    pub fn update_settings(
        &self,
        document: &Value,
    ) -> Result<Arc<MessagingSettings>, SettingsError> {
        self.settings.update(document)
    }

    pub fn settings(&self) -> Arc<MessagingSettings> {
        self.settings.snapshot()
    }

    /// Operator test message through the production dispatch path.
    pub async fn test_send(&self, channel: ChannelId, recipient: &str) -> DispatchOutcome {
        let settings = self.settings.snapshot();
        self.channels.test_send(&settings, channel, recipient).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reminder::InMemoryLedger;
    use crate::settings::InMemoryRepository;
    use crate::store::InMemoryInvoiceStore;

    fn engine() -> NotificationEngine {
        NotificationEngine::new(
            Arc::new(InMemoryRepository::new()),
            Arc::new(InMemoryInvoiceStore::default()),
            Arc::new(InMemoryLedger::new()),
            EngineOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn engine_starts_from_defaults() {
        let engine = engine();
        let settings = engine.settings();
        assert!(settings.automation.enabled);
        assert_eq!(settings.automation.default_channels, vec![ChannelId::WhatsApp]);
    }

    #[test]
    fn settings_update_is_visible_immediately() {
        let engine = engine();
        engine
            .update_settings(&serde_json::json!({ "automation": { "enabled": false } }))
            .unwrap();
        assert!(!engine.settings().automation.enabled);
    }

    #[tokio::test]
    async fn test_send_on_default_settings_uses_whatsapp_web() {
        let engine = engine();
        let outcome = engine.test_send(ChannelId::WhatsApp, "+201001234567").await;
        let receipt = outcome.result.unwrap();
        assert!(receipt.web_link.is_some());
    }
}
