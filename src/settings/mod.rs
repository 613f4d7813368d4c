//! The `messaging_settings` document: typed schema, built-in defaults,
//! deep merge with saved values, and save-time validation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::reminder::ledger::RuleKind;
use crate::reminder::schedule::{ReminderSchedule, ScheduleError};

pub mod store;

pub use store::{InMemoryRepository, JsonFileRepository, SettingsRepository, SettingsStore};

/// Key under which the host stores the document.
pub const SETTINGS_KEY: &str = "messaging_settings";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Invalid(#[from] ScheduleError),
    #[error("automation references unknown template key '{0}'")]
    MissingTemplate(String),
    #[error("failed to decode settings document: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to persist settings document: {0}")]
    Persist(String),
}

/// Channel ids as they appear in `automation.defaultChannels`.
///
/// The `whatsapp` id covers both transport variants (API preferred, Web
/// deep-link fallback); the split into variants happens at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelId {
    WhatsApp,
    Email,
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WhatsApp => f.write_str("whatsapp"),
            Self::Email => f.write_str("email"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateCategory {
    Invoice,
    Repair,
    Quotation,
    Payment,
}

/// One entry of the built-in template catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDef {
    pub body: String,
    #[serde(default)]
    pub variables: Vec<String>,
    pub category: TemplateCategory,
}

/// Operator-defined template bound to an entity type and optionally a status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomTemplate {
    pub key: String,
    pub entity_type: crate::events::EntityType,
    #[serde(default)]
    pub status: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub web_enabled: bool,
    #[serde(default)]
    pub api_enabled: bool,
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_token: String,
    /// Per-key overrides of the built-in catalogue, WhatsApp-flavored
    /// wording. Applied on top of `templates` when the catalogue is merged.
    #[serde(default)]
    pub templates: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for WhatsAppSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            web_enabled: true,
            api_enabled: false,
            api_url: String::new(),
            api_token: String::new(),
            templates: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default)]
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    #[serde(default = "default_subject")]
    pub default_subject: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_true() -> bool {
    true
}
fn default_smtp_port() -> u16 {
    587
}
fn default_from_name() -> String {
    "FixFlow ERP".into()
}
fn default_subject() -> String {
    "فاتورة #{invoiceId} - FixFlow".into()
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_user: String::new(),
            smtp_password: String::new(),
            from_email: String::new(),
            from_name: default_from_name(),
            default_subject: default_subject(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceAutomation {
    #[serde(default = "default_true")]
    pub notify_on_created: bool,
}

impl Default for InvoiceAutomation {
    fn default() -> Self {
        Self {
            notify_on_created: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairAutomation {
    #[serde(default = "default_true")]
    pub notify_on_received: bool,
    #[serde(default = "default_true")]
    pub notify_on_diagnosed: bool,
    #[serde(default = "default_true")]
    pub notify_on_awaiting_approval: bool,
    /// Off by default, can get noisy.
    #[serde(default)]
    pub notify_on_under_repair: bool,
    #[serde(default = "default_true")]
    pub notify_on_waiting_parts: bool,
    #[serde(default = "default_true")]
    pub notify_on_ready_pickup: bool,
    #[serde(default = "default_true")]
    pub notify_on_completed: bool,
    #[serde(default)]
    pub notify_on_rejected: bool,
    #[serde(default)]
    pub notify_on_on_hold: bool,
}

impl Default for RepairAutomation {
    fn default() -> Self {
        Self {
            notify_on_received: true,
            notify_on_diagnosed: true,
            notify_on_awaiting_approval: true,
            notify_on_under_repair: false,
            notify_on_waiting_parts: true,
            notify_on_ready_pickup: true,
            notify_on_completed: true,
            notify_on_rejected: false,
            notify_on_on_hold: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationAutomation {
    #[serde(default = "default_true")]
    pub notify_on_sent: bool,
    #[serde(default = "default_true")]
    pub notify_on_approved: bool,
}

impl Default for QuotationAutomation {
    fn default() -> Self {
        Self {
            notify_on_sent: true,
            notify_on_approved: true,
        }
    }
}

/// A single reminder rule (`overdueReminders` / `beforeDueReminders`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRule {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub schedule: ReminderSchedule,
    /// Only meaningful for the before-due rule; falls back to 3 when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_before_due: Option<i64>,
    #[serde(default = "default_min_days")]
    pub min_days_between_reminders: i64,
}

fn default_min_days() -> i64 {
    1
}

pub const DEFAULT_DAYS_BEFORE_DUE: i64 = 3;

impl ReminderRule {
    pub fn days_before_due(&self) -> i64 {
        self.days_before_due.unwrap_or(DEFAULT_DAYS_BEFORE_DUE)
    }

    pub fn validate(&self, kind: RuleKind) -> Result<(), ScheduleError> {
        self.schedule.validate()?;
        if self.min_days_between_reminders < 1 {
            return Err(ScheduleError::InvalidRule(format!(
                "{kind}: minDaysBetweenReminders must be at least 1, got {}",
                self.min_days_between_reminders
            )));
        }
        if let Some(days) = self.days_before_due {
            if days < 0 {
                return Err(ScheduleError::InvalidRule(format!(
                    "{kind}: daysBeforeDue must not be negative, got {days}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAutomation {
    #[serde(default = "default_true")]
    pub notify_on_received: bool,
    #[serde(default = "default_overdue_rule")]
    pub overdue_reminders: ReminderRule,
    #[serde(default = "default_before_due_rule")]
    pub before_due_reminders: ReminderRule,
}

fn default_overdue_rule() -> ReminderRule {
    ReminderRule {
        enabled: true,
        schedule: ReminderSchedule::daily("09:00"),
        days_before_due: None,
        min_days_between_reminders: 1,
    }
}

fn default_before_due_rule() -> ReminderRule {
    ReminderRule {
        enabled: true,
        schedule: ReminderSchedule::daily("10:00"),
        days_before_due: Some(DEFAULT_DAYS_BEFORE_DUE),
        min_days_between_reminders: 1,
    }
}

impl Default for PaymentAutomation {
    fn default() -> Self {
        Self {
            notify_on_received: true,
            overdue_reminders: default_overdue_rule(),
            before_due_reminders: default_before_due_rule(),
        }
    }
}

impl PaymentAutomation {
    pub fn rule(&self, kind: RuleKind) -> &ReminderRule {
        match kind {
            RuleKind::Overdue => &self.overdue_reminders,
            RuleKind::BeforeDue => &self.before_due_reminders,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_channels")]
    pub default_channels: Vec<ChannelId>,
    #[serde(default)]
    pub invoice: InvoiceAutomation,
    #[serde(default)]
    pub repair: RepairAutomation,
    #[serde(default)]
    pub quotation: QuotationAutomation,
    #[serde(default)]
    pub payment: PaymentAutomation,
}

fn default_channels() -> Vec<ChannelId> {
    vec![ChannelId::WhatsApp]
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_channels: default_channels(),
            invoice: InvoiceAutomation::default(),
            repair: RepairAutomation::default(),
            quotation: QuotationAutomation::default(),
            payment: PaymentAutomation::default(),
        }
    }
}

/// The whole `messaging_settings` document.
///
/// Unknown top-level keys survive a load/save round trip via `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagingSettings {
    #[serde(default)]
    pub whatsapp: WhatsAppSettings,
    #[serde(default)]
    pub email: EmailSettings,
    #[serde(default = "builtin_templates")]
    pub templates: BTreeMap<String, TemplateDef>,
    #[serde(default)]
    pub automation: AutomationSettings,
    #[serde(default)]
    pub custom_templates: Vec<CustomTemplate>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            whatsapp: WhatsAppSettings::default(),
            email: EmailSettings::default(),
            templates: builtin_templates(),
            automation: AutomationSettings::default(),
            custom_templates: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl MessagingSettings {
    /// Decode a saved document: deep-merge over defaults, then validate.
    pub fn from_document(saved: &Value) -> Result<Self, SettingsError> {
        let merged = merge_with_defaults(saved);
        let settings: Self = serde_json::from_value(merged)?;
        settings.validate()?;
        Ok(settings)
    }

    /// The full default document, as JSON.
    pub fn default_document() -> Value {
        serde_json::to_value(Self::default()).expect("default settings serialize to JSON")
    }

    /// Save-time checks. Anything rejected here never reaches the repository.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.automation
            .payment
            .overdue_reminders
            .validate(RuleKind::Overdue)?;
        self.automation
            .payment
            .before_due_reminders
            .validate(RuleKind::BeforeDue)?;

        let catalogue = crate::template::TemplateSet::from_settings(self);
        for key in crate::notifier::referenced_template_keys() {
            if !catalogue.contains(key) {
                return Err(SettingsError::MissingTemplate(key.to_string()));
            }
        }
        Ok(())
    }
}

/// Deep-merge a saved document over the default document.
///
/// Objects merge key by key, recursively. Saved scalars and arrays win.
/// Explicit `null` counts as absent, so the default survives. Keys unknown
/// to the defaults are carried through untouched.
pub fn merge_with_defaults(saved: &Value) -> Value {
    deep_merge(MessagingSettings::default_document(), saved)
}

fn deep_merge(base: Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (base, Value::Null) => base,
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                base.insert(key.clone(), merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay.clone(),
    }
}

fn template(body: &str, variables: &[&str], category: TemplateCategory) -> TemplateDef {
    TemplateDef {
        body: body.to_string(),
        variables: variables.iter().map(|v| (*v).to_string()).collect(),
        category,
    }
}

/// The built-in catalogue. Saved documents can override individual entries;
/// the merge always backfills the rest.
#[allow(clippy::too_many_lines)]
pub fn builtin_templates() -> BTreeMap<String, TemplateDef> {
    let mut templates = BTreeMap::new();

    templates.insert(
        "defaultMessage".to_string(),
        template(
            "مرحباً {customerName}، فاتورتك رقم #{invoiceId} جاهزة بمبلغ {totalAmount} {currency}. يمكنك تحميلها من: {invoiceLink}",
            &["customerName", "invoiceId", "totalAmount", "currency", "invoiceLink"],
            TemplateCategory::Invoice,
        ),
    );

    templates.insert(
        "repairReceivedMessage".to_string(),
        template(
            "جهازك وصل FixFlow يا فندم\n\nده ملخص الطلب :\n\n• رقم الطلب: {repairNumber}\n\n• الجهاز: {deviceInfo}\n\n• المشكلة: {problem}{oldInvoiceNumber}\n\nتقدر تشوف التحديثات أول بأول من هنا:\n\n{trackingUrl}\n\nفريق الفنيين هيبدأ الفحص خلال الساعات القادمة.",
            &["customerName", "repairNumber", "deviceInfo", "problem", "oldInvoiceNumber", "trackingUrl"],
            TemplateCategory::Repair,
        ),
    );

    templates.insert(
        "diagnosisCompleteMessage".to_string(),
        template(
            "عزيزي {customerName}،\n\nتم الانتهاء من تشخيص جهازك {deviceInfo}.\n\n• رقم الطلب: {repairNumber}\n• المشكلة: {problem}\n• التشخيص: {diagnosis}\n• التكلفة المتوقعة: {estimatedCost}\n\nيمكنك متابعة التحديثات من هنا:\n{trackingUrl}\n\nفريق FixFlow",
            &["customerName", "deviceInfo", "repairNumber", "problem", "diagnosis", "estimatedCost", "trackingUrl"],
            TemplateCategory::Repair,
        ),
    );

    templates.insert(
        "awaitingApprovalMessage".to_string(),
        template(
            "عزيزي {customerName}،\n\nتم إعداد عرض سعر لإصلاح جهازك\n\n• رقم الطلب: {repairNumber}\n• الجهاز: {deviceInfo}\n• التكلفة المتوقعة: {estimatedCost}\n\nيرجى مراجعة العرض والموافقة عليه للمتابعة.\n\nيمكنك متابعة التحديثات من هنا:\n{trackingUrl}\n\nننتظر موافقتك 📋\nفريق FixFlow",
            &["customerName", "repairNumber", "deviceInfo", "estimatedCost", "trackingUrl"],
            TemplateCategory::Repair,
        ),
    );

    templates.insert(
        "underRepairMessage".to_string(),
        template(
            "عزيزي {customerName}،\n\nتم البدء في إصلاح جهازك\n\n• رقم الطلب: {repairNumber}\n• الجهاز: {deviceInfo}\n\nفريق الفنيين يعمل على إصلاح جهازك الآن.\n\nيمكنك متابعة التحديثات من هنا:\n{trackingUrl}\n\nشكراً لصبرك ⚙️\nفريق FixFlow",
            &["customerName", "repairNumber", "deviceInfo", "trackingUrl"],
            TemplateCategory::Repair,
        ),
    );

    templates.insert(
        "waitingPartsMessage".to_string(),
        template(
            "عزيزي {customerName}،\n\nنحتاج لقطع غيار لجهازك {deviceInfo}\n\n• رقم الطلب: {repairNumber}\n• المشكلة: {problem}\n\nنحن بانتظار وصول قطع الغيار المطلوبة. سيتم إكمال الإصلاح فور وصولها.\n\nيمكنك متابعة التحديثات من هنا:\n{trackingUrl}\n\nشكراً لصبرك 🙏\nفريق FixFlow",
            &["customerName", "deviceInfo", "repairNumber", "problem", "trackingUrl"],
            TemplateCategory::Repair,
        ),
    );

    templates.insert(
        "readyPickupMessage".to_string(),
        template(
            "عزيزي {customerName}،\n\nجهازك جاهز للاستلام! 🎉\n\n• رقم الطلب: {repairNumber}\n• الجهاز: {deviceInfo}\n\nيمكنك استلام جهازك من:\n{location}\n\nيمكنك متابعة التحديثات من هنا:\n{trackingUrl}\n\nننتظرك في أي وقت مناسب لك 📍\nفريق FixFlow",
            &["customerName", "repairNumber", "deviceInfo", "location", "trackingUrl"],
            TemplateCategory::Repair,
        ),
    );

    templates.insert(
        "repairCompletedMessage".to_string(),
        template(
            "عزيزي {customerName}،\n\nتم إكمال إصلاح جهازك بنجاح! ✅\n\n• رقم الطلب: {repairNumber}\n• الجهاز: {deviceInfo}\n\nيمكنك استلام جهازك من:\n{location}\n\nيمكنك متابعة التحديثات من هنا:\n{trackingUrl}\n\nشكراً لثقتك بنا 🌟\nفريق FixFlow",
            &["customerName", "repairNumber", "deviceInfo", "location", "trackingUrl"],
            TemplateCategory::Repair,
        ),
    );

    templates.insert(
        "completedMessage".to_string(),
        template(
            "عزيزي {customerName}،\n\nتم إكمال إصلاح جهازك بنجاح! ✅\n\n• رقم الطلب: {repairNumber}\n• الجهاز: {deviceInfo}\n\nيمكنك استلام جهازك من:\n{location}\n\nيمكنك متابعة التحديثات من هنا:\n{trackingUrl}\n\nشكراً لثقتك بنا 🌟\nفريق FixFlow",
            &["customerName", "repairNumber", "deviceInfo", "location", "trackingUrl"],
            TemplateCategory::Repair,
        ),
    );

    templates.insert(
        "deliveredMessage".to_string(),
        template(
            "عزيزي {customerName}،\n\nتم تسليم جهازك بنجاح! ✅\n\n• رقم الطلب: {repairNumber}\n• الجهاز: {deviceInfo}\n\nنتمنى أن يكون كل شيء على ما يرام.\n\nإذا كان لديك أي استفسار، لا تتردد في التواصل معنا.\n\nشكراً لثقتك بنا 🌟\nفريق FixFlow",
            &["customerName", "repairNumber", "deviceInfo"],
            TemplateCategory::Repair,
        ),
    );

    templates.insert(
        "rejectedMessage".to_string(),
        template(
            "عزيزي {customerName}،\n\nنعتذر، تم رفض طلب إصلاح جهازك\n\n• رقم الطلب: {repairNumber}\n• الجهاز: {deviceInfo}\n• السبب: {rejectionReason}\n\nيمكنك التواصل معنا لمزيد من التفاصيل.\n\nشكراً لتفهمك\nفريق FixFlow",
            &["customerName", "repairNumber", "deviceInfo", "rejectionReason"],
            TemplateCategory::Repair,
        ),
    );

    templates.insert(
        "onHoldMessage".to_string(),
        template(
            "عزيزي {customerName}،\n\nتم تعليق طلب إصلاح جهازك مؤقتاً\n\n• رقم الطلب: {repairNumber}\n• الجهاز: {deviceInfo}\n• السبب: {holdReason}\n\nسيتم متابعة الطلب قريباً.\n\nيمكنك متابعة التحديثات من هنا:\n{trackingUrl}\n\nشكراً لصبرك\nفريق FixFlow",
            &["customerName", "repairNumber", "deviceInfo", "holdReason", "trackingUrl"],
            TemplateCategory::Repair,
        ),
    );

    templates.insert(
        "quotationDefaultMessage".to_string(),
        template(
            "عزيزي {customerName}،\n\nتم إعداد عرض سعر جديد لك:\n\n• رقم العرض: #{quotationId}\n• رقم الطلب: {repairNumber}\n• المبلغ الإجمالي: {totalAmount} {currency}\n• صالح حتى: {validUntil}\n\nيمكنك مراجعة العرض والموافقة من هنا:\n{quotationLink}\n\nشكراً لثقتك بنا\nفريق FixFlow",
            &["customerName", "quotationId", "repairNumber", "totalAmount", "currency", "validUntil", "quotationLink"],
            TemplateCategory::Quotation,
        ),
    );

    templates.insert(
        "quotationApprovedMessage".to_string(),
        template(
            "عزيزي {customerName}،\n\nشكراً لموافقتك على عرض السعر! ✅\n\n• رقم العرض: #{quotationId}\n• المبلغ: {totalAmount} {currency}\n\nسيتم البدء في الإصلاح قريباً.\n\nيمكنك متابعة التحديثات من هنا:\n{trackingUrl}\n\nفريق FixFlow",
            &["customerName", "quotationId", "totalAmount", "currency", "trackingUrl"],
            TemplateCategory::Quotation,
        ),
    );

    templates.insert(
        "paymentReceivedMessage".to_string(),
        template(
            "عزيزي {customerName}،\n\nتم استلام دفعتك بنجاح! ✅\n\n• المبلغ: {paymentAmount} {currency}\n• الفاتورة: #{invoiceId}\n• المبلغ المتبقي: {remainingAmount} {currency}\n\nشكراً لتعاملكم معنا\nفريق FixFlow",
            &["customerName", "paymentAmount", "currency", "invoiceId", "remainingAmount"],
            TemplateCategory::Payment,
        ),
    );

    templates.insert(
        "paymentOverdueReminder".to_string(),
        template(
            "عزيزي {customerName}،\n\nتذكير: فاتورة #{invoiceId} متأخرة عن السداد\n\n• المبلغ الإجمالي: {totalAmount} {currency}\n• المبلغ المدفوع: {amountPaid} {currency}\n• المبلغ المتبقي: {remainingAmount} {currency}\n• تاريخ الاستحقاق: {dueDate}\n\nيرجى تسوية المبلغ في أقرب وقت ممكن.\n\nيمكنك الدفع من هنا:\n{invoiceLink}\n\nشكراً لتعاملكم معنا\nفريق FixFlow",
            &["customerName", "invoiceId", "totalAmount", "amountPaid", "remainingAmount", "currency", "dueDate", "invoiceLink"],
            TemplateCategory::Payment,
        ),
    );

    templates.insert(
        "paymentBeforeDueReminder".to_string(),
        template(
            "عزيزي {customerName}،\n\nتذكير ودود: فاتورة #{invoiceId} تقترب من تاريخ الاستحقاق\n\n• المبلغ الإجمالي: {totalAmount} {currency}\n• المبلغ المدفوع: {amountPaid} {currency}\n• المبلغ المتبقي: {remainingAmount} {currency}\n• تاريخ الاستحقاق: {dueDate}\n\nيمكنك الدفع من هنا:\n{invoiceLink}\n\nشكراً لتعاملكم معنا\nفريق FixFlow",
            &["customerName", "invoiceId", "totalAmount", "amountPaid", "remainingAmount", "currency", "dueDate", "invoiceLink"],
            TemplateCategory::Payment,
        ),
    );

    templates
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_switches_match_the_documented_catalogue() {
        let settings = MessagingSettings::default();
        assert!(settings.automation.enabled);
        assert_eq!(settings.automation.default_channels, vec![ChannelId::WhatsApp]);
        assert!(settings.automation.repair.notify_on_received);
        assert!(!settings.automation.repair.notify_on_under_repair);
        assert!(!settings.automation.repair.notify_on_rejected);
        assert!(!settings.automation.repair.notify_on_on_hold);
        assert!(settings.automation.payment.overdue_reminders.enabled);
        assert_eq!(
            settings.automation.payment.before_due_reminders.days_before_due(),
            3
        );
        assert_eq!(settings.email.smtp_port, 587);
        assert!(!settings.email.enabled);
    }

    #[test]
    fn builtin_catalogue_covers_every_referenced_key() {
        let settings = MessagingSettings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn merge_preserves_unknown_keys_and_fills_missing() {
        let saved = json!({
            "whatsapp": { "apiEnabled": true, "apiUrl": "https://wa.example/send" },
            "futureSection": { "anything": 1 }
        });

        let merged = merge_with_defaults(&saved);
        assert_eq!(merged["whatsapp"]["apiEnabled"], json!(true));
        assert_eq!(merged["whatsapp"]["apiUrl"], json!("https://wa.example/send"));
        // untouched defaults backfilled
        assert_eq!(merged["whatsapp"]["webEnabled"], json!(true));
        assert_eq!(merged["email"]["smtpPort"], json!(587));
        // unknown key survives
        assert_eq!(merged["futureSection"]["anything"], json!(1));

        let settings = MessagingSettings::from_document(&saved).unwrap();
        assert!(settings.whatsapp.api_enabled);
        assert_eq!(settings.extra["futureSection"]["anything"], json!(1));
    }

    #[test]
    fn merge_treats_explicit_null_as_absent() {
        let saved = json!({ "email": null });
        let merged = merge_with_defaults(&saved);
        assert_eq!(merged["email"]["smtpPort"], json!(587));
    }

    #[test]
    fn saved_scalar_and_array_win_over_defaults() {
        let saved = json!({
            "automation": { "defaultChannels": ["whatsapp", "email"], "enabled": false }
        });
        let settings = MessagingSettings::from_document(&saved).unwrap();
        assert!(!settings.automation.enabled);
        assert_eq!(
            settings.automation.default_channels,
            vec![ChannelId::WhatsApp, ChannelId::Email]
        );
    }

    #[test]
    fn zero_cooldown_is_rejected() {
        let saved = json!({
            "automation": { "payment": { "overdueReminders": {
                "enabled": true,
                "schedule": { "type": "daily", "time": "09:00" },
                "minDaysBetweenReminders": 0
            }}}
        });
        let err = MessagingSettings::from_document(&saved).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)), "got {err:?}");
    }

    #[test]
    fn negative_days_before_due_is_rejected() {
        let saved = json!({
            "automation": { "payment": { "beforeDueReminders": {
                "enabled": true,
                "schedule": { "type": "daily", "time": "10:00" },
                "daysBeforeDue": -1,
                "minDaysBetweenReminders": 1
            }}}
        });
        assert!(MessagingSettings::from_document(&saved).is_err());
    }

    #[test]
    fn bad_schedule_time_is_rejected() {
        let saved = json!({
            "automation": { "payment": { "overdueReminders": {
                "enabled": true,
                "schedule": { "type": "daily", "time": "25:99" },
                "minDaysBetweenReminders": 1
            }}}
        });
        assert!(MessagingSettings::from_document(&saved).is_err());
    }

    #[test]
    fn template_override_round_trips_through_document() {
        let saved = json!({
            "templates": { "defaultMessage": {
                "body": "فاتورة {invoiceId} جاهزة يا {customerName}",
                "category": "invoice"
            }}
        });
        let settings = MessagingSettings::from_document(&saved).unwrap();
        assert_eq!(
            settings.templates["defaultMessage"].body,
            "فاتورة {invoiceId} جاهزة يا {customerName}"
        );
        // the rest of the catalogue is still there
        assert!(settings.templates.contains_key("readyPickupMessage"));
    }
}
