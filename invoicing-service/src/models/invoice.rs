//! Invoice header model for invoicing-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::InvoiceItem;

/// Invoice header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: i64,
    pub business_id: Uuid,
    pub customer_id: Uuid,
    pub total_amount: Decimal,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub is_paid: bool,
    pub paid_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an invoice header.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub invoice_number: i64,
    pub business_id: Uuid,
    pub customer_id: Uuid,
    pub total_amount: Decimal,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub is_paid: bool,
    pub paid_date: Option<DateTime<Utc>>,
}

/// Full replacement of the mutable header fields.
#[derive(Debug, Clone)]
pub struct UpdateInvoice {
    pub customer_id: Uuid,
    pub total_amount: Decimal,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub is_paid: bool,
    pub paid_date: Option<DateTime<Utc>>,
}

/// Header together with its line items, in item order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceWithItems {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
}

/// Paid date consistent with the paid flag: kept (or stamped with `now`)
/// while paid, always cleared while unpaid.
pub fn settle_paid_date(
    is_paid: bool,
    requested: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if is_paid {
        Some(requested.unwrap_or(now))
    } else {
        None
    }
}

impl NewInvoice {
    /// Enforce the paid flag/date invariant before persisting.
    pub fn settled(mut self, now: DateTime<Utc>) -> Self {
        self.paid_date = settle_paid_date(self.is_paid, self.paid_date, now);
        self
    }
}

impl UpdateInvoice {
    /// Enforce the paid flag/date invariant before persisting.
    pub fn settled(mut self, now: DateTime<Utc>) -> Self {
        self.paid_date = settle_paid_date(self.is_paid, self.paid_date, now);
        self
    }
}
