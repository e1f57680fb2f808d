//! Storage seams for invoicing-service.
//!
//! Every backend (PostgreSQL, in-memory) implements the same traits so the
//! service layer and the HTTP handlers never know which one they talk to.

use std::sync::Arc;

use async_trait::async_trait;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    Business, Customer, Invoice, InvoiceItem, InvoiceWithItems, NewInvoice, NewInvoiceItem,
    Product, UpdateInvoice, UpdateInvoiceItem,
};
use crate::services::database::Database;
use crate::services::memory::MemoryStore;

/// Invoice headers and the per-business number sequence.
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Advisory next number: one past the highest number the business ever used.
    async fn next_invoice_number(&self, business_id: Uuid) -> Result<i64, AppError>;

    /// Insert a header. `Conflict` when the number is taken within the business,
    /// `BadRequest` when the business or its customer does not exist.
    async fn create_invoice(&self, input: &NewInvoice) -> Result<Invoice, AppError>;

    /// Insert a header and its items as one unit.
    async fn create_invoice_with_items(
        &self,
        input: &NewInvoice,
        items: &[NewInvoiceItem],
    ) -> Result<InvoiceWithItems, AppError>;

    async fn get_invoice(&self, id: Uuid) -> Result<Invoice, AppError>;

    async fn list_invoices_by_business(&self, business_id: Uuid)
        -> Result<Vec<Invoice>, AppError>;

    /// Replace the header fields. `BadRequest` when the customer is not one
    /// of the invoice's business.
    async fn update_invoice(&self, id: Uuid, input: &UpdateInvoice) -> Result<Invoice, AppError>;

    /// Replace the header and the item set as one unit. An empty `items`
    /// slice keeps the existing items; any failure leaves both unchanged.
    async fn update_invoice_with_items(
        &self,
        id: Uuid,
        input: &UpdateInvoice,
        items: &[NewInvoiceItem],
    ) -> Result<InvoiceWithItems, AppError>;

    /// Flip the paid flag, setting or clearing the paid date in the same step.
    async fn toggle_invoice_status(&self, id: Uuid) -> Result<Invoice, AppError>;

    /// Remove a header together with its items.
    async fn delete_invoice(&self, id: Uuid) -> Result<(), AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

/// Line items, always scoped to their owning invoice.
#[async_trait]
pub trait InvoiceItemRepository: Send + Sync {
    async fn create_item(
        &self,
        invoice_id: Uuid,
        input: &NewInvoiceItem,
    ) -> Result<InvoiceItem, AppError>;

    async fn get_item(&self, invoice_id: Uuid, item_id: Uuid) -> Result<InvoiceItem, AppError>;

    /// Items of an invoice in their stored order. Empty for unknown invoices.
    async fn list_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, AppError>;

    async fn update_item(
        &self,
        invoice_id: Uuid,
        item_id: Uuid,
        input: &UpdateInvoiceItem,
    ) -> Result<InvoiceItem, AppError>;

    async fn delete_item(&self, invoice_id: Uuid, item_id: Uuid) -> Result<(), AppError>;

    /// Swap the whole item set of an invoice atomically.
    ///
    /// An empty `items` slice leaves the existing items untouched. A missing
    /// product reference rejects the whole set and keeps the previous items.
    /// `NotFound` when the invoice does not exist.
    async fn replace_items(
        &self,
        invoice_id: Uuid,
        items: &[NewInvoiceItem],
    ) -> Result<Vec<InvoiceItem>, AppError>;
}

#[async_trait]
pub trait BusinessDirectory: Send + Sync {
    async fn get_business(&self, id: Uuid) -> Result<Business, AppError>;
}

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn get_customer(&self, id: Uuid) -> Result<Customer, AppError>;
}

#[async_trait]
pub trait ProductDirectory: Send + Sync {
    /// Full catalog of a business, by name.
    async fn list_products_by_business(&self, business_id: Uuid)
        -> Result<Vec<Product>, AppError>;
}

/// The set of stores a running service works against.
#[derive(Clone)]
pub struct Stores {
    pub invoices: Arc<dyn InvoiceRepository>,
    pub items: Arc<dyn InvoiceItemRepository>,
    pub businesses: Arc<dyn BusinessDirectory>,
    pub customers: Arc<dyn CustomerDirectory>,
    pub products: Arc<dyn ProductDirectory>,
}

impl Stores {
    pub fn postgres(db: Database) -> Self {
        let db = Arc::new(db);
        Self {
            invoices: db.clone(),
            items: db.clone(),
            businesses: db.clone(),
            customers: db.clone(),
            products: db,
        }
    }

    pub fn in_memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            invoices: store.clone(),
            items: store.clone(),
            businesses: store.clone(),
            customers: store.clone(),
            products: store,
        }
    }
}

/// Reject items whose product reference is missing or nil.
pub(crate) fn require_product_refs(items: &[NewInvoiceItem]) -> Result<Vec<Uuid>, AppError> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.product_ref().ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!(
                    "Item {} is missing a product reference",
                    index + 1
                ))
            })
        })
        .collect()
}
