//! Payment reminder scheduler: periodic ticks, edge-triggered schedule
//! matching, per-invoice cooldown against the durable ledger, and a bounded
//! dispatch pool. A tick never aborts on individual failures; everything is
//! reported in the returned `TickReport`.

use chrono::{Days, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::channels::{ChannelSet, Recipients};
use crate::engine::EngineOptions;
use crate::events::{format_date, format_money};
use crate::settings::{MessagingSettings, ReminderRule, SettingsStore};
use crate::store::{InvoiceStatus, InvoiceStore, OpenInvoice};
use crate::template::{ResolutionError, TemplateSet};

pub mod ledger;
pub mod schedule;

pub use ledger::{InMemoryLedger, LedgerError, ReminderLedger, RuleKind, SqliteLedger};
pub use schedule::{ReminderSchedule, ScheduleError, ScheduleType};

/// Time source for the scheduler, in naive local business time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("all channels failed: {0}")]
    AllChannelsFailed(String),
    #[error("invoice has no phone and no email")]
    NoRecipient,
    #[error("dispatch task failed: {0}")]
    TaskFailed(String),
}

#[derive(Debug)]
pub struct ReminderFailure {
    pub invoice_id: i64,
    pub error: ReminderError,
}

/// What one rule did during one tick.
#[derive(Debug)]
pub struct RuleTickReport {
    pub kind: RuleKind,
    pub fired: bool,
    pub candidates: usize,
    pub sent: Vec<i64>,
    pub skipped_cooldown: Vec<i64>,
    pub failures: Vec<ReminderFailure>,
}

impl RuleTickReport {
    fn idle(kind: RuleKind) -> Self {
        Self {
            kind,
            fired: false,
            candidates: 0,
            sent: Vec::new(),
            skipped_cooldown: Vec::new(),
            failures: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct TickReport {
    pub at: NaiveDateTime,
    /// True when another tick held the lease; nothing was evaluated.
    pub overlapped: bool,
    pub store_error: Option<String>,
    pub rules: Vec<RuleTickReport>,
}

impl TickReport {
    pub fn dispatched(&self) -> usize {
        self.rules.iter().map(|r| r.sent.len()).sum()
    }
}

enum InvoiceOutcome {
    Sent(i64),
    Cooldown(i64),
    Failed(ReminderFailure),
}

pub struct ReminderScheduler {
    settings: Arc<SettingsStore>,
    invoices: Arc<dyn InvoiceStore>,
    ledger: Arc<dyn ReminderLedger>,
    channels: Arc<ChannelSet>,
    clock: Arc<dyn Clock>,
    options: EngineOptions,
    lease: tokio::sync::Mutex<()>,
    last_tick: parking_lot::Mutex<Option<NaiveDateTime>>,
}

impl ReminderScheduler {
    pub fn new(
        settings: Arc<SettingsStore>,
        invoices: Arc<dyn InvoiceStore>,
        ledger: Arc<dyn ReminderLedger>,
        channels: Arc<ChannelSet>,
        clock: Arc<dyn Clock>,
        options: EngineOptions,
    ) -> Self {
        Self {
            settings,
            invoices,
            ledger,
            channels,
            clock,
            options,
            lease: tokio::sync::Mutex::new(()),
            last_tick: parking_lot::Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// One scheduler pass. Safe to call on any cadence; schedule matching
    /// is edge-triggered against the window since the previous tick.
    pub async fn tick(&self) -> TickReport {
        let now = self.clock.now();

        let Ok(_lease) = self.lease.try_lock() else {
            warn!("tick skipped, previous tick still running");
            return TickReport {
                at: now,
                overlapped: true,
                store_error: None,
                rules: Vec::new(),
            };
        };

        // First tick after startup: the window opens at local midnight, so
        // a restart after the scheduled time still evaluates today's rules.
        // The ledger keeps that from double-sending. The window is only
        // committed once the invoice store answered; a failed read leaves
        // `last_tick` untouched so the next tick re-observes the same edge
        // instead of silently losing the day's reminders.
        let last = self
            .last_tick
            .lock()
            .unwrap_or_else(|| now.date().and_hms_opt(0, 0, 0).unwrap_or(now));

        let settings = self.settings.snapshot();
        let mut report = TickReport {
            at: now,
            overlapped: false,
            store_error: None,
            rules: Vec::new(),
        };

        if !settings.automation.enabled {
            debug!("automation disabled, tick is a no-op");
            *self.last_tick.lock() = Some(now);
            return report;
        }

        let fired: Vec<RuleKind> = [RuleKind::BeforeDue, RuleKind::Overdue]
            .into_iter()
            .filter(|&kind| {
                let rule = settings.automation.payment.rule(kind);
                rule.enabled && rule.schedule.fires_between(last, now)
            })
            .collect();
        if fired.is_empty() {
            report.rules = vec![
                RuleTickReport::idle(RuleKind::BeforeDue),
                RuleTickReport::idle(RuleKind::Overdue),
            ];
            *self.last_tick.lock() = Some(now);
            return report;
        }

        let invoices = match self.invoices.open_invoices() {
            Ok(invoices) => invoices,
            Err(e) => {
                warn!("invoice store unavailable, skipping tick: {e}");
                report.store_error = Some(e.to_string());
                return report;
            }
        };
        *self.last_tick.lock() = Some(now);

        let templates = Arc::new(TemplateSet::from_settings(&settings));
        for kind in [RuleKind::BeforeDue, RuleKind::Overdue] {
            let mut rule_report = RuleTickReport::idle(kind);
            if fired.contains(&kind) {
                rule_report.fired = true;
                let rule = settings.automation.payment.rule(kind);
                self.run_rule(kind, rule, &invoices, &settings, &templates, now.date(), &mut rule_report)
                    .await;
                info!(
                    rule = %kind,
                    candidates = rule_report.candidates,
                    sent = rule_report.sent.len(),
                    cooldown = rule_report.skipped_cooldown.len(),
                    failures = rule_report.failures.len(),
                    "reminder rule evaluated"
                );
            }
            report.rules.push(rule_report);
        }
        report
    }

    async fn run_rule(
        &self,
        kind: RuleKind,
        rule: &ReminderRule,
        invoices: &[OpenInvoice],
        settings: &Arc<MessagingSettings>,
        templates: &Arc<TemplateSet>,
        today: NaiveDate,
        report: &mut RuleTickReport,
    ) {
        let candidates: Vec<OpenInvoice> = invoices
            .iter()
            .filter(|invoice| is_candidate(kind, rule, invoice, today))
            .cloned()
            .collect();
        report.candidates = candidates.len();

        let semaphore = Arc::new(Semaphore::new(self.options.dispatch_concurrency.max(1)));
        let mut pool: JoinSet<InvoiceOutcome> = JoinSet::new();

        for invoice in candidates {
            let semaphore = semaphore.clone();
            let ledger = self.ledger.clone();
            let channels = self.channels.clone();
            let settings = settings.clone();
            let templates = templates.clone();
            let frontend_url = self.options.frontend_url.clone();
            let min_days = rule.min_days_between_reminders;

            pool.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                remind_invoice(
                    &ledger,
                    &channels,
                    &settings,
                    &templates,
                    &frontend_url,
                    &invoice,
                    kind,
                    min_days,
                    today,
                )
                .await
            });
        }

        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(InvoiceOutcome::Sent(id)) => report.sent.push(id),
                Ok(InvoiceOutcome::Cooldown(id)) => report.skipped_cooldown.push(id),
                Ok(InvoiceOutcome::Failed(failure)) => report.failures.push(failure),
                Err(join_err) => report.failures.push(ReminderFailure {
                    invoice_id: -1,
                    error: ReminderError::TaskFailed(join_err.to_string()),
                }),
            }
        }
        report.sent.sort_unstable();
        report.skipped_cooldown.sort_unstable();
    }
}

fn is_candidate(kind: RuleKind, rule: &ReminderRule, invoice: &OpenInvoice, today: NaiveDate) -> bool {
    if invoice.status == InvoiceStatus::Paid || invoice.remaining() <= 0.0 {
        return false;
    }
    match kind {
        RuleKind::Overdue => invoice.due_date < today,
        // exact day match: (due_date - daysBeforeDue) == today, nothing else
        RuleKind::BeforeDue => {
            let offset = rule.days_before_due();
            u64::try_from(offset).is_ok_and(|offset| {
                today.checked_add_days(Days::new(offset)) == Some(invoice.due_date)
            })
        }
    }
}

fn invoice_variables(
    invoice: &OpenInvoice,
    frontend_url: &str,
) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    vars.insert(
        "customerName".to_string(),
        invoice.customer.display_name().to_string(),
    );
    vars.insert("invoiceId".to_string(), invoice.id.to_string());
    vars.insert(
        "totalAmount".to_string(),
        format_money(invoice.total_amount, &invoice.currency),
    );
    vars.insert(
        "amountPaid".to_string(),
        format_money(invoice.amount_paid, &invoice.currency),
    );
    vars.insert(
        "remainingAmount".to_string(),
        format_money(invoice.remaining(), &invoice.currency),
    );
    vars.insert("currency".to_string(), invoice.currency.clone());
    vars.insert("dueDate".to_string(), format_date(invoice.due_date));
    vars.insert(
        "invoiceLink".to_string(),
        format!("{}/invoices/{}", frontend_url.trim_end_matches('/'), invoice.id),
    );
    vars
}

#[allow(clippy::too_many_arguments)]
async fn remind_invoice(
    ledger: &Arc<dyn ReminderLedger>,
    channels: &Arc<ChannelSet>,
    settings: &Arc<MessagingSettings>,
    templates: &Arc<TemplateSet>,
    frontend_url: &str,
    invoice: &OpenInvoice,
    kind: RuleKind,
    min_days: i64,
    today: NaiveDate,
) -> InvoiceOutcome {
    // cooldown gate first, before any rendering or IO
    match ledger.last_sent(invoice.id, kind) {
        Ok(Some(last)) if today.signed_duration_since(last).num_days() < min_days => {
            debug!(invoice = invoice.id, rule = %kind, "within cooldown, skipping");
            return InvoiceOutcome::Cooldown(invoice.id);
        }
        Ok(_) => {}
        Err(e) => {
            return InvoiceOutcome::Failed(ReminderFailure {
                invoice_id: invoice.id,
                error: e.into(),
            });
        }
    }

    let recipients = Recipients {
        phone: invoice.customer.phone.clone(),
        email: invoice.customer.email.clone(),
    };
    if recipients.is_empty() {
        warn!(invoice = invoice.id, "invoice customer unreachable, skipping");
        return InvoiceOutcome::Failed(ReminderFailure {
            invoice_id: invoice.id,
            error: ReminderError::NoRecipient,
        });
    }

    let variables = invoice_variables(invoice, frontend_url);
    let resolved = match templates.resolve(kind.template_key(), &variables) {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!(invoice = invoice.id, rule = %kind, "template missing: {e}");
            return InvoiceOutcome::Failed(ReminderFailure {
                invoice_id: invoice.id,
                error: e.into(),
            });
        }
    };

    let subject = crate::template::substitute(&settings.email.default_subject, &variables).text;
    let correlation_id = format!(
        "reminder:{}:{}:{}",
        invoice.id,
        kind.as_str(),
        today.format("%Y-%m-%d")
    );

    let outcomes = channels
        .dispatch_all(
            settings,
            &settings.automation.default_channels,
            &recipients,
            &resolved.text,
            Some(&subject),
            &correlation_id,
        )
        .await;

    if outcomes.iter().any(crate::channels::DispatchOutcome::succeeded) {
        // record after the send: a crash between the two means a possible
        // duplicate tomorrow, never a silently dropped reminder
        match ledger.record_sent(invoice.id, kind, today) {
            Ok(()) => InvoiceOutcome::Sent(invoice.id),
            Err(e) => InvoiceOutcome::Failed(ReminderFailure {
                invoice_id: invoice.id,
                error: e.into(),
            }),
        }
    } else {
        let summary = outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(ToString::to_string))
            .collect::<Vec<_>>()
            .join("; ");
        InvoiceOutcome::Failed(ReminderFailure {
            invoice_id: invoice.id,
            error: ReminderError::AllChannelsFailed(summary),
        })
    }
}
