//! Domain events emitted by the host ERP and the snapshots they carry.
//!
//! Snapshots are pre-formatted: amounts, dates and links arrive as display
//! strings so template resolution stays a pure string operation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Repair,
    Invoice,
    Quotation,
    Payment,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Repair => "repair",
            Self::Invoice => "invoice",
            Self::Quotation => "quotation",
            Self::Payment => "payment",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStatus {
    Received,
    Diagnosed,
    AwaitingApproval,
    UnderRepair,
    WaitingParts,
    ReadyPickup,
    Completed,
    Delivered,
    Rejected,
    OnHold,
}

impl RepairStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Diagnosed => "diagnosed",
            Self::AwaitingApproval => "awaiting_approval",
            Self::UnderRepair => "under_repair",
            Self::WaitingParts => "waiting_parts",
            Self::ReadyPickup => "ready_pickup",
            Self::Completed => "completed",
            Self::Delivered => "delivered",
            Self::Rejected => "rejected",
            Self::OnHold => "on_hold",
        }
    }

    /// Customer-facing Arabic status label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Received => "تم الاستلام",
            Self::Diagnosed => "تم التشخيص",
            Self::AwaitingApproval => "بانتظار الموافقة",
            Self::UnderRepair => "قيد الإصلاح",
            Self::WaitingParts => "بانتظار قطع الغيار",
            Self::ReadyPickup => "جاهز للاستلام",
            Self::Completed => "مكتمل",
            Self::Delivered => "تم التسليم",
            Self::Rejected => "مرفوض",
            Self::OnHold => "معلّق",
        }
    }
}

/// Lifecycle transition the event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Created,
    Approved,
    Received,
    Status(RepairStatus),
}

impl Transition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Approved => "approved",
            Self::Received => "received",
            Self::Status(status) => status.as_str(),
        }
    }
}

/// Customer contact block. `phone`/`email` drive recipient routing.
#[derive(Debug, Clone)]
pub struct CustomerRef {
    pub name: String,
    pub first_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl CustomerRef {
    pub fn display_name(&self) -> &str {
        self.first_name.as_deref().unwrap_or(&self.name)
    }

    pub fn reachable(&self) -> bool {
        self.phone.is_some() || self.email.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct RepairSnapshot {
    pub repair_number: String,
    pub device_info: String,
    pub problem: String,
    pub diagnosis: String,
    pub estimated_cost: String,
    pub tracking_url: String,
    pub location: String,
    pub old_invoice_number: Option<String>,
    pub rejection_reason: Option<String>,
    pub hold_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InvoiceSnapshot {
    pub invoice_number: String,
    pub total_amount: String,
    pub amount_paid: String,
    pub remaining_amount: String,
    pub currency: String,
    pub due_date: String,
    pub invoice_link: String,
    pub status_label: String,
}

#[derive(Debug, Clone)]
pub struct QuotationSnapshot {
    pub quotation_number: String,
    pub repair_number: String,
    pub total_amount: String,
    pub currency: String,
    pub valid_until: String,
    pub quotation_link: String,
    pub tracking_url: String,
}

#[derive(Debug, Clone)]
pub struct PaymentSnapshot {
    pub payment_amount: String,
    pub invoice_number: String,
    pub remaining_amount: String,
    pub currency: String,
    pub payment_date: String,
}

#[derive(Debug, Clone)]
pub enum EntityData {
    Repair(RepairSnapshot),
    Invoice(InvoiceSnapshot),
    Quotation(QuotationSnapshot),
    Payment(PaymentSnapshot),
}

#[derive(Debug, Clone)]
pub struct EntitySnapshot {
    pub customer: CustomerRef,
    pub data: EntityData,
}

impl EntitySnapshot {
    /// Assemble the substitution variables for this snapshot.
    ///
    /// Missing optional fields render as empty strings, except the rejection
    /// and hold reasons which fall back to "غير محدد" so the customer never
    /// sees a blank reason line.
    pub fn variables(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert(
            "customerName".to_string(),
            self.customer.display_name().to_string(),
        );

        match &self.data {
            EntityData::Repair(repair) => {
                vars.insert("repairNumber".into(), repair.repair_number.clone());
                vars.insert("deviceInfo".into(), repair.device_info.clone());
                vars.insert("problem".into(), repair.problem.clone());
                vars.insert("diagnosis".into(), repair.diagnosis.clone());
                vars.insert("estimatedCost".into(), repair.estimated_cost.clone());
                vars.insert("trackingUrl".into(), repair.tracking_url.clone());
                vars.insert("location".into(), repair.location.clone());
                vars.insert(
                    "oldInvoiceNumber".into(),
                    repair
                        .old_invoice_number
                        .as_ref()
                        .map(|n| format!("\n• فاتورة قديمة: #{n}"))
                        .unwrap_or_default(),
                );
                vars.insert(
                    "rejectionReason".into(),
                    repair
                        .rejection_reason
                        .clone()
                        .unwrap_or_else(|| "غير محدد".to_string()),
                );
                vars.insert(
                    "holdReason".into(),
                    repair
                        .hold_reason
                        .clone()
                        .unwrap_or_else(|| "غير محدد".to_string()),
                );
            }
            EntityData::Invoice(invoice) => {
                vars.insert("invoiceId".into(), invoice.invoice_number.clone());
                vars.insert("totalAmount".into(), invoice.total_amount.clone());
                vars.insert("amountPaid".into(), invoice.amount_paid.clone());
                vars.insert("remainingAmount".into(), invoice.remaining_amount.clone());
                vars.insert("currency".into(), invoice.currency.clone());
                vars.insert("dueDate".into(), invoice.due_date.clone());
                vars.insert("invoiceLink".into(), invoice.invoice_link.clone());
                vars.insert("status".into(), invoice.status_label.clone());
            }
            EntityData::Quotation(quotation) => {
                vars.insert("quotationId".into(), quotation.quotation_number.clone());
                vars.insert("repairNumber".into(), quotation.repair_number.clone());
                vars.insert("totalAmount".into(), quotation.total_amount.clone());
                vars.insert("currency".into(), quotation.currency.clone());
                vars.insert("validUntil".into(), quotation.valid_until.clone());
                vars.insert("quotationLink".into(), quotation.quotation_link.clone());
                vars.insert("trackingUrl".into(), quotation.tracking_url.clone());
            }
            EntityData::Payment(payment) => {
                vars.insert("paymentAmount".into(), payment.payment_amount.clone());
                vars.insert("invoiceId".into(), payment.invoice_number.clone());
                vars.insert("remainingAmount".into(), payment.remaining_amount.clone());
                vars.insert("currency".into(), payment.currency.clone());
                vars.insert("paymentDate".into(), payment.payment_date.clone());
            }
        }
        vars
    }
}

/// One lifecycle notification from the host.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub entity: EntityType,
    pub entity_id: i64,
    pub transition: Transition,
    pub occurred_at: DateTime<Utc>,
    pub snapshot: EntitySnapshot,
}

impl NotificationEvent {
    /// Deterministic id a downstream transport can de-duplicate on.
    pub fn correlation_id(&self) -> String {
        format!(
            "{}:{}:{}",
            self.entity.as_str(),
            self.entity_id,
            self.transition.as_str()
        )
    }
}

/// Display formatting shared by snapshots and the reminder scheduler.
pub fn format_money(amount: f64, currency: &str) -> String {
    format!("{amount:.2} {currency}")
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}
