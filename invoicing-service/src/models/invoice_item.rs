//! Invoice line item model for invoicing-service.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Line item owned by exactly one invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub sort_order: i32,
}

/// Input for inserting a line item.
///
/// `product_id` stays optional so a missing reference can be rejected inside
/// the atomic unit that inserts it.
#[derive(Debug, Clone)]
pub struct NewInvoiceItem {
    pub product_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Input for updating a single line item.
#[derive(Debug, Clone)]
pub struct UpdateInvoiceItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl NewInvoiceItem {
    /// Product reference, treating the nil UUID as absent.
    pub fn product_ref(&self) -> Option<Uuid> {
        self.product_id.filter(|id| !id.is_nil())
    }
}
