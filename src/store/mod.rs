//! Port to the host's invoice persistence. The engine never owns business
//! entities; it only asks for the open (not fully paid) invoices a reminder
//! pass should consider.

use chrono::NaiveDate;

use crate::events::CustomerRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Unpaid,
    PartiallyPaid,
    Overdue,
    Paid,
}

#[derive(Debug, Clone)]
pub struct OpenInvoice {
    pub id: i64,
    pub customer: CustomerRef,
    pub total_amount: f64,
    pub amount_paid: f64,
    pub currency: String,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
}

impl OpenInvoice {
    pub fn remaining(&self) -> f64 {
        self.total_amount - self.amount_paid
    }
}

pub trait InvoiceStore: Send + Sync {
    /// Invoices with an outstanding balance. The scheduler applies the
    /// per-rule date filters on top.
    fn open_invoices(&self) -> anyhow::Result<Vec<OpenInvoice>>;
}

/// Test and demo double backed by a plain Vec.
#[derive(Default)]
pub struct InMemoryInvoiceStore {
    invoices: parking_lot::Mutex<Vec<OpenInvoice>>,
}

impl InMemoryInvoiceStore {
    pub fn new(invoices: Vec<OpenInvoice>) -> Self {
        Self {
            invoices: parking_lot::Mutex::new(invoices),
        }
    }

    pub fn set(&self, invoices: Vec<OpenInvoice>) {
        *self.invoices.lock() = invoices;
    }
}

impl InvoiceStore for InMemoryInvoiceStore {
    fn open_invoices(&self) -> anyhow::Result<Vec<OpenInvoice>> {
        Ok(self.invoices.lock().clone())
    }
}
