//! Read-only views of business, customer and product records.
//!
//! These records are owned by other services; invoicing only reads them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Issuing business, including the banking details printed on documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Business {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub gst_number: String,
    pub company_email: String,
    pub company_phone: String,
    pub address: String,
    pub city: String,
    pub zip_code: String,
    pub state: String,
    pub country: String,
    pub bank_name: String,
    pub account_number: String,
    pub ifsc: String,
    pub bank_branch: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub business_id: Uuid,
    pub name: String,
    pub gst_number: String,
    pub email: String,
    pub phone: String,
    pub billing_address: String,
    pub shipping_address: String,
}

/// Catalog entry; `tax_rate` is a percentage between 0 and 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub business_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub tax_rate: Decimal,
    pub unit: String,
    pub hsn_code: String,
}
