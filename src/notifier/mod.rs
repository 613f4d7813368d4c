//! Event-triggered notifier: one policy table maps (entity, transition) to
//! a template key and its automation switch, then the dispatch fan-out runs.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::channels::{ChannelSet, DispatchOutcome, Recipients};
use crate::engine::EngineOptions;
use crate::events::{EntityType, NotificationEvent, RepairStatus, Transition};
use crate::settings::{AutomationSettings, SettingsStore};
use crate::template::TemplateSet;

/// One row of the automation policy: which template a transition sends and
/// which settings switch gates it.
pub struct PolicyEntry {
    pub entity: EntityType,
    pub transition: Transition,
    pub template_key: &'static str,
    pub is_enabled: fn(&AutomationSettings) -> bool,
}

/// The whole mapping in one place. Adding a notification means adding a row
/// here, not another scattered boolean check.
pub static POLICY_TABLE: &[PolicyEntry] = &[
    PolicyEntry {
        entity: EntityType::Repair,
        transition: Transition::Status(RepairStatus::Received),
        template_key: "repairReceivedMessage",
        is_enabled: |a| a.repair.notify_on_received,
    },
    PolicyEntry {
        entity: EntityType::Repair,
        transition: Transition::Status(RepairStatus::Diagnosed),
        template_key: "diagnosisCompleteMessage",
        is_enabled: |a| a.repair.notify_on_diagnosed,
    },
    PolicyEntry {
        entity: EntityType::Repair,
        transition: Transition::Status(RepairStatus::AwaitingApproval),
        template_key: "awaitingApprovalMessage",
        is_enabled: |a| a.repair.notify_on_awaiting_approval,
    },
    PolicyEntry {
        entity: EntityType::Repair,
        transition: Transition::Status(RepairStatus::UnderRepair),
        template_key: "underRepairMessage",
        is_enabled: |a| a.repair.notify_on_under_repair,
    },
    PolicyEntry {
        entity: EntityType::Repair,
        transition: Transition::Status(RepairStatus::WaitingParts),
        template_key: "waitingPartsMessage",
        is_enabled: |a| a.repair.notify_on_waiting_parts,
    },
    PolicyEntry {
        entity: EntityType::Repair,
        transition: Transition::Status(RepairStatus::ReadyPickup),
        template_key: "readyPickupMessage",
        is_enabled: |a| a.repair.notify_on_ready_pickup,
    },
    PolicyEntry {
        entity: EntityType::Repair,
        transition: Transition::Status(RepairStatus::Completed),
        template_key: "completedMessage",
        is_enabled: |a| a.repair.notify_on_completed,
    },
    PolicyEntry {
        entity: EntityType::Repair,
        transition: Transition::Status(RepairStatus::Delivered),
        template_key: "deliveredMessage",
        is_enabled: |a| a.repair.notify_on_completed,
    },
    PolicyEntry {
        entity: EntityType::Repair,
        transition: Transition::Status(RepairStatus::Rejected),
        template_key: "rejectedMessage",
        is_enabled: |a| a.repair.notify_on_rejected,
    },
    PolicyEntry {
        entity: EntityType::Repair,
        transition: Transition::Status(RepairStatus::OnHold),
        template_key: "onHoldMessage",
        is_enabled: |a| a.repair.notify_on_on_hold,
    },
    PolicyEntry {
        entity: EntityType::Invoice,
        transition: Transition::Created,
        template_key: "defaultMessage",
        is_enabled: |a| a.invoice.notify_on_created,
    },
    PolicyEntry {
        entity: EntityType::Quotation,
        transition: Transition::Created,
        template_key: "quotationDefaultMessage",
        is_enabled: |a| a.quotation.notify_on_sent,
    },
    PolicyEntry {
        entity: EntityType::Quotation,
        transition: Transition::Approved,
        template_key: "quotationApprovedMessage",
        is_enabled: |a| a.quotation.notify_on_approved,
    },
    PolicyEntry {
        entity: EntityType::Payment,
        transition: Transition::Received,
        template_key: "paymentReceivedMessage",
        is_enabled: |a| a.payment.notify_on_received,
    },
];

pub fn policy_for(entity: EntityType, transition: Transition) -> Option<&'static PolicyEntry> {
    POLICY_TABLE
        .iter()
        .find(|entry| entry.entity == entity && entry.transition == transition)
}

/// Every template key the automation can reference, reminder templates
/// included. Settings validation checks the catalogue against this list.
pub fn referenced_template_keys() -> impl Iterator<Item = &'static str> {
    POLICY_TABLE
        .iter()
        .map(|entry| entry.template_key)
        .chain(["paymentOverdueReminder", "paymentBeforeDueReminder"])
}

pub struct Notifier {
    settings: Arc<SettingsStore>,
    channels: Arc<ChannelSet>,
    options: EngineOptions,
}

impl Notifier {
    pub fn new(
        settings: Arc<SettingsStore>,
        channels: Arc<ChannelSet>,
        options: EngineOptions,
    ) -> Self {
        Self {
            settings,
            channels,
            options,
        }
    }

    /// React to one lifecycle event. Stateless: a duplicate event produces
    /// a duplicate dispatch with the same correlation id, and the upstream
    /// feed is trusted to deliver each transition at most once.
    pub async fn on_event(&self, event: &NotificationEvent) -> Vec<DispatchOutcome> {
        let settings = self.settings.snapshot();

        if !settings.automation.enabled {
            debug!(correlation_id = %event.correlation_id(), "automation disabled");
            return Vec::new();
        }
        let Some(entry) = policy_for(event.entity, event.transition) else {
            debug!(correlation_id = %event.correlation_id(), "no policy for transition");
            return Vec::new();
        };
        if !(entry.is_enabled)(&settings.automation) {
            debug!(
                correlation_id = %event.correlation_id(),
                template = entry.template_key,
                "notification switched off"
            );
            return Vec::new();
        }

        let recipients = Recipients {
            phone: event.snapshot.customer.phone.clone(),
            email: event.snapshot.customer.email.clone(),
        };
        if recipients.is_empty() {
            warn!(
                correlation_id = %event.correlation_id(),
                "customer has no phone and no email, skipping"
            );
            return Vec::new();
        }

        let mut variables = event.snapshot.variables();
        if let Transition::Status(status) = event.transition {
            variables.insert("status".to_string(), status.label().to_string());
        }
        // pickup location falls back to the shop address from the host config
        if variables.get("location").is_some_and(String::is_empty) {
            variables.insert("location".to_string(), self.options.company_address.clone());
        }

        let templates = TemplateSet::from_settings(&settings);
        let subject = subject_for(event);
        let correlation_id = event.correlation_id();
        let mut outcomes = Vec::new();

        match templates.resolve(entry.template_key, &variables) {
            Ok(resolved) => {
                if !resolved.unresolved.is_empty() {
                    warn!(
                        correlation_id = %correlation_id,
                        template = entry.template_key,
                        unresolved = ?resolved.unresolved,
                        "placeholders left literal"
                    );
                }
                outcomes.extend(
                    self.channels
                        .dispatch_all(
                            &settings,
                            &settings.automation.default_channels,
                            &recipients,
                            &resolved.text,
                            Some(&subject),
                            &correlation_id,
                        )
                        .await,
                );
            }
            // fail soft: a deleted template must not take the event loop down
            Err(e) => warn!(correlation_id = %correlation_id, "skipping dispatch: {e}"),
        }

        for custom in settings.custom_templates.iter().filter(|custom| {
            custom.entity_type == event.entity
                && custom
                    .status
                    .as_deref()
                    .is_none_or(|s| s == event.transition.as_str())
        }) {
            let resolved = crate::template::substitute(&custom.body, &variables);
            let custom_correlation = format!("{correlation_id}:custom:{}", custom.key);
            outcomes.extend(
                self.channels
                    .dispatch_all(
                        &settings,
                        &settings.automation.default_channels,
                        &recipients,
                        &resolved.text,
                        Some(&subject),
                        &custom_correlation,
                    )
                    .await,
            );
        }

        outcomes
    }
}

fn subject_for(event: &NotificationEvent) -> String {
    match event.entity {
        EntityType::Invoice | EntityType::Payment => {
            format!("فاتورة رقم #{} - FixFlow", event.entity_id)
        }
        EntityType::Quotation => format!("عرض سعر رقم #{} - FixFlow", event.entity_id),
        EntityType::Repair => format!("تحديث طلب الإصلاح #{} - FixFlow", event.entity_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MessagingSettings;
    use crate::template::TemplateSet;

    #[test]
    fn every_mapped_transition_has_a_catalogue_template() {
        let catalogue = TemplateSet::from_settings(&MessagingSettings::default());
        for key in referenced_template_keys() {
            assert!(catalogue.contains(key), "missing template '{key}'");
        }
    }

    #[test]
    fn policy_lookup_matches_on_both_entity_and_transition() {
        let entry = policy_for(EntityType::Invoice, Transition::Created).unwrap();
        assert_eq!(entry.template_key, "defaultMessage");

        let entry = policy_for(
            EntityType::Repair,
            Transition::Status(RepairStatus::ReadyPickup),
        )
        .unwrap();
        assert_eq!(entry.template_key, "readyPickupMessage");

        // invoice has no 'approved' transition mapped
        assert!(policy_for(EntityType::Invoice, Transition::Approved).is_none());
    }

    #[test]
    fn noisy_transitions_are_off_by_default() {
        let automation = MessagingSettings::default().automation;
        let under_repair = policy_for(
            EntityType::Repair,
            Transition::Status(RepairStatus::UnderRepair),
        )
        .unwrap();
        assert!(!(under_repair.is_enabled)(&automation));

        let received = policy_for(
            EntityType::Repair,
            Transition::Status(RepairStatus::Received),
        )
        .unwrap();
        assert!((received.is_enabled)(&automation));
    }
}
