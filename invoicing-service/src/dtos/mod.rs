//! Request and response bodies for the HTTP API.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::{NewInvoice, NewInvoiceItem, UpdateInvoice, UpdateInvoiceItem};

fn non_nil_uuid(value: &Uuid) -> Result<(), ValidationError> {
    if value.is_nil() {
        return Err(ValidationError::new("nil_uuid"));
    }
    Ok(())
}

const AMOUNT_SCALE: u32 = 4;
/// Largest amount a `NUMERIC(19, 4)` column holds.
const MAX_AMOUNT: Decimal = Decimal::from_parts(0x89E7_FFFF, 0x8AC7_2304, 0, false, AMOUNT_SCALE);

fn storable_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("negative_amount"));
    }
    if *value > MAX_AMOUNT {
        let mut err = ValidationError::new("amount_too_large");
        err.message = Some("amount must not exceed 999999999999999.9999".into());
        return Err(err);
    }
    if value.normalize().scale() > AMOUNT_SCALE {
        let mut err = ValidationError::new("amount_precision");
        err.message = Some("amount must have at most 4 decimal places".into());
        return Err(err);
    }
    Ok(())
}

fn due_not_before_issue(invoice_date: NaiveDate, due_date: NaiveDate) -> Result<(), ValidationError> {
    if due_date < invoice_date {
        let mut err = ValidationError::new("due_before_invoice_date");
        err.message = Some("due_date must not be earlier than invoice_date".into());
        return Err(err);
    }
    Ok(())
}

fn create_dates(req: &CreateInvoiceRequest) -> Result<(), ValidationError> {
    due_not_before_issue(req.invoice_date, req.due_date)
}

fn update_dates(req: &UpdateInvoiceRequest) -> Result<(), ValidationError> {
    due_not_before_issue(req.invoice_date, req.due_date)
}

/// One line of an invoice as supplied by clients.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InvoiceItemPayload {
    #[validate(custom(function = "non_nil_uuid"))]
    pub product_id: Uuid,

    #[validate(range(min = 1))]
    pub quantity: i32,

    #[validate(custom(function = "storable_amount"))]
    pub unit_price: Decimal,
}

impl From<&InvoiceItemPayload> for NewInvoiceItem {
    fn from(item: &InvoiceItemPayload) -> Self {
        Self {
            product_id: Some(item.product_id),
            quantity: item.quantity,
            unit_price: item.unit_price,
        }
    }
}

impl From<&InvoiceItemPayload> for UpdateInvoiceItem {
    fn from(item: &InvoiceItemPayload) -> Self {
        Self {
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "create_dates"))]
pub struct CreateInvoiceRequest {
    #[validate(range(min = 1))]
    pub invoice_number: i64,

    #[validate(custom(function = "non_nil_uuid"))]
    pub business_id: Uuid,

    #[validate(custom(function = "non_nil_uuid"))]
    pub customer_id: Uuid,

    #[validate(custom(function = "storable_amount"))]
    pub total_amount: Decimal,

    pub invoice_date: NaiveDate,

    pub due_date: NaiveDate,

    #[serde(default)]
    pub is_paid: bool,

    #[serde(default)]
    pub paid_date: Option<DateTime<Utc>>,

    #[serde(default)]
    #[validate(nested)]
    pub items: Vec<InvoiceItemPayload>,
}

impl CreateInvoiceRequest {
    pub fn into_parts(self) -> (NewInvoice, Vec<NewInvoiceItem>) {
        let items = self.items.iter().map(NewInvoiceItem::from).collect();
        let invoice = NewInvoice {
            invoice_number: self.invoice_number,
            business_id: self.business_id,
            customer_id: self.customer_id,
            total_amount: self.total_amount,
            invoice_date: self.invoice_date,
            due_date: self.due_date,
            is_paid: self.is_paid,
            paid_date: self.paid_date,
        };
        (invoice, items)
    }
}

/// Full replacement of an invoice. An empty `items` list keeps the
/// existing items.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "update_dates"))]
pub struct UpdateInvoiceRequest {
    #[validate(custom(function = "non_nil_uuid"))]
    pub customer_id: Uuid,

    #[validate(custom(function = "storable_amount"))]
    pub total_amount: Decimal,

    pub invoice_date: NaiveDate,

    pub due_date: NaiveDate,

    #[serde(default)]
    pub is_paid: bool,

    #[serde(default)]
    pub paid_date: Option<DateTime<Utc>>,

    #[serde(default)]
    #[validate(nested)]
    pub items: Vec<InvoiceItemPayload>,
}

impl UpdateInvoiceRequest {
    pub fn into_parts(self) -> (UpdateInvoice, Vec<NewInvoiceItem>) {
        let items = self.items.iter().map(NewInvoiceItem::from).collect();
        let invoice = UpdateInvoice {
            customer_id: self.customer_id,
            total_amount: self.total_amount,
            invoice_date: self.invoice_date,
            due_date: self.due_date,
            is_paid: self.is_paid,
            paid_date: self.paid_date,
        };
        (invoice, items)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NextInvoiceNumberResponse {
    pub next_invoice_number: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_body() -> serde_json::Value {
        json!({
            "invoice_number": 1,
            "business_id": Uuid::new_v4(),
            "customer_id": Uuid::new_v4(),
            "total_amount": "236.00",
            "invoice_date": "2024-05-01",
            "due_date": "2024-05-31",
            "items": [
                { "product_id": Uuid::new_v4(), "quantity": 2, "unit_price": "100.00" }
            ]
        })
    }

    #[test]
    fn accepts_a_well_formed_invoice() {
        let req: CreateInvoiceRequest = serde_json::from_value(create_body()).unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn rejects_zero_quantity_inside_items() {
        let mut body = create_body();
        body["items"][0]["quantity"] = json!(0);
        let req: CreateInvoiceRequest = serde_json::from_value(body).unwrap();

        let errors = req.validate().unwrap_err();
        assert!(errors.errors().contains_key("items"));
    }

    #[test]
    fn rejects_nil_product_and_negative_amounts() {
        let mut body = create_body();
        body["items"][0]["product_id"] = json!(Uuid::nil());
        body["total_amount"] = json!("-1");
        let req: CreateInvoiceRequest = serde_json::from_value(body).unwrap();

        let errors = req.validate().unwrap_err();
        assert!(errors.errors().contains_key("items"));
        assert!(errors.errors().contains_key("total_amount"));
    }

    #[test]
    fn max_amount_matches_the_column_limit() {
        assert_eq!(MAX_AMOUNT.to_string(), "999999999999999.9999");
    }

    #[test]
    fn rejects_amounts_beyond_the_stored_range() {
        let mut body = create_body();
        body["items"][0]["unit_price"] = json!("1000000000000000");
        body["total_amount"] = json!("79228162514264337593543950335");
        let req: CreateInvoiceRequest = serde_json::from_value(body).unwrap();

        let errors = req.validate().unwrap_err();
        assert!(errors.errors().contains_key("items"));
        assert!(errors.errors().contains_key("total_amount"));
    }

    #[test]
    fn amount_limits_are_inclusive() {
        assert!(storable_amount(&MAX_AMOUNT).is_ok());
        assert!(storable_amount(&Decimal::ZERO).is_ok());
        assert!(storable_amount(&"12.3400000".parse().unwrap()).is_ok());
        assert!(storable_amount(&"0.00001".parse().unwrap()).is_err());
    }

    #[test]
    fn rejects_due_date_before_invoice_date() {
        let mut body = create_body();
        body["due_date"] = json!("2024-04-01");
        let req: CreateInvoiceRequest = serde_json::from_value(body).unwrap();

        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_non_positive_invoice_numbers() {
        let mut body = create_body();
        body["invoice_number"] = json!(0);
        let req: CreateInvoiceRequest = serde_json::from_value(body).unwrap();

        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("invoice_number"));
    }
}
