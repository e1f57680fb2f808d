//! Invoice lifecycle operations behind the HTTP handlers.

use std::time::Instant;

use anyhow::anyhow;
use service_core::error::AppError;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::middleware::UserId;
use crate::models::{
    Invoice, InvoiceItem, InvoiceWithItems, NewInvoice, NewInvoiceItem, UpdateInvoice,
    UpdateInvoiceItem,
};
use crate::render::{render_invoice, RenderedInvoice};
use crate::services::assembly::assemble;
use crate::services::metrics::{ERRORS_TOTAL, INVOICES_TOTAL, RENDER_DURATION};
use crate::services::repository::Stores;

#[derive(Clone)]
pub struct InvoiceService {
    stores: Stores,
}

impl InvoiceService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    #[instrument(skip(self, user), fields(user_id = %user, business_id = %business_id))]
    pub async fn next_invoice_number(
        &self,
        user: &UserId,
        business_id: Uuid,
    ) -> Result<i64, AppError> {
        self.stores.invoices.next_invoice_number(business_id).await
    }

    /// Create the header and its items in one unit.
    #[instrument(skip(self, user, invoice, items), fields(user_id = %user, business_id = %invoice.business_id, invoice_number = invoice.invoice_number))]
    pub async fn create_invoice(
        &self,
        user: &UserId,
        invoice: NewInvoice,
        items: Vec<NewInvoiceItem>,
    ) -> Result<InvoiceWithItems, AppError> {
        let created = self
            .stores
            .invoices
            .create_invoice_with_items(&invoice, &items)
            .await?;

        INVOICES_TOTAL.with_label_values(&["created"]).inc();
        info!(invoice_id = %created.invoice.id, item_count = created.items.len(), "Invoice created");

        Ok(created)
    }

    #[instrument(skip(self, user), fields(user_id = %user, invoice_id = %id))]
    pub async fn get_invoice(&self, user: &UserId, id: Uuid) -> Result<InvoiceWithItems, AppError> {
        let invoice = self.stores.invoices.get_invoice(id).await?;
        let items = self.stores.items.list_items(id).await?;
        Ok(InvoiceWithItems { invoice, items })
    }

    /// Every invoice of a business with its items, ordered by number.
    #[instrument(skip(self, user), fields(user_id = %user, business_id = %business_id))]
    pub async fn list_invoices(
        &self,
        user: &UserId,
        business_id: Uuid,
    ) -> Result<Vec<InvoiceWithItems>, AppError> {
        let mut invoices = self
            .stores
            .invoices
            .list_invoices_by_business(business_id)
            .await?;
        invoices.sort_by_key(|inv| inv.invoice_number);

        let mut listed = Vec::with_capacity(invoices.len());
        for invoice in invoices {
            let items = self.stores.items.list_items(invoice.id).await?;
            listed.push(InvoiceWithItems { invoice, items });
        }
        Ok(listed)
    }

    /// Replace the header and the item set in one unit. An empty item list
    /// keeps the current items.
    #[instrument(skip(self, user, invoice, items), fields(user_id = %user, invoice_id = %id, item_count = items.len()))]
    pub async fn update_invoice(
        &self,
        user: &UserId,
        id: Uuid,
        invoice: UpdateInvoice,
        items: Vec<NewInvoiceItem>,
    ) -> Result<InvoiceWithItems, AppError> {
        let updated = self
            .stores
            .invoices
            .update_invoice_with_items(id, &invoice, &items)
            .await?;

        INVOICES_TOTAL.with_label_values(&["updated"]).inc();
        info!(item_count = updated.items.len(), "Invoice updated");

        Ok(updated)
    }

    #[instrument(skip(self, user), fields(user_id = %user, invoice_id = %id))]
    pub async fn toggle_status(&self, user: &UserId, id: Uuid) -> Result<Invoice, AppError> {
        let invoice = self.stores.invoices.toggle_invoice_status(id).await?;

        let event = if invoice.is_paid { "paid" } else { "unpaid" };
        INVOICES_TOTAL.with_label_values(&[event]).inc();
        info!(is_paid = invoice.is_paid, "Invoice status toggled");

        Ok(invoice)
    }

    #[instrument(skip(self, user), fields(user_id = %user, invoice_id = %id))]
    pub async fn delete_invoice(&self, user: &UserId, id: Uuid) -> Result<(), AppError> {
        self.stores.invoices.delete_invoice(id).await?;

        INVOICES_TOTAL.with_label_values(&["deleted"]).inc();
        info!("Invoice deleted");

        Ok(())
    }

    /// Assemble and render the invoice document off the async runtime.
    #[instrument(skip(self, user), fields(user_id = %user, invoice_id = %id))]
    pub async fn render_document(
        &self,
        user: &UserId,
        id: Uuid,
    ) -> Result<RenderedInvoice, AppError> {
        let view = assemble(&self.stores, id).await?;

        let started = Instant::now();
        let result = tokio::task::spawn_blocking(move || render_invoice(&view))
            .await
            .map_err(|e| AppError::InternalError(anyhow!("Render task failed: {}", e)))?;

        let outcome = if result.is_ok() { "ok" } else { "error" };
        RENDER_DURATION
            .with_label_values(&[outcome])
            .observe(started.elapsed().as_secs_f64());

        let rendered = result.map_err(|e| {
            ERRORS_TOTAL.with_label_values(&["render"]).inc();
            error!(error = %e, "Invoice render failed");
            AppError::from(e)
        })?;

        info!(
            page_count = rendered.page_count,
            size_bytes = rendered.bytes.len(),
            "Invoice rendered"
        );
        Ok(rendered)
    }

    // -------------------------------------------------------------------------
    // Item Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, user, item), fields(user_id = %user, invoice_id = %invoice_id))]
    pub async fn add_item(
        &self,
        user: &UserId,
        invoice_id: Uuid,
        item: NewInvoiceItem,
    ) -> Result<InvoiceItem, AppError> {
        let created = self.stores.items.create_item(invoice_id, &item).await?;
        info!(item_id = %created.id, "Invoice item added");
        Ok(created)
    }

    #[instrument(skip(self, user), fields(user_id = %user, invoice_id = %invoice_id, item_id = %item_id))]
    pub async fn get_item(
        &self,
        user: &UserId,
        invoice_id: Uuid,
        item_id: Uuid,
    ) -> Result<InvoiceItem, AppError> {
        self.stores.items.get_item(invoice_id, item_id).await
    }

    /// Items of an existing invoice; `NotFound` when the invoice is missing.
    #[instrument(skip(self, user), fields(user_id = %user, invoice_id = %invoice_id))]
    pub async fn list_items(
        &self,
        user: &UserId,
        invoice_id: Uuid,
    ) -> Result<Vec<InvoiceItem>, AppError> {
        self.stores.invoices.get_invoice(invoice_id).await?;
        self.stores.items.list_items(invoice_id).await
    }

    #[instrument(skip(self, user, item), fields(user_id = %user, invoice_id = %invoice_id, item_id = %item_id))]
    pub async fn update_item(
        &self,
        user: &UserId,
        invoice_id: Uuid,
        item_id: Uuid,
        item: UpdateInvoiceItem,
    ) -> Result<InvoiceItem, AppError> {
        let updated = self
            .stores
            .items
            .update_item(invoice_id, item_id, &item)
            .await?;
        info!("Invoice item updated");
        Ok(updated)
    }

    #[instrument(skip(self, user), fields(user_id = %user, invoice_id = %invoice_id, item_id = %item_id))]
    pub async fn delete_item(
        &self,
        user: &UserId,
        invoice_id: Uuid,
        item_id: Uuid,
    ) -> Result<(), AppError> {
        self.stores.items.delete_item(invoice_id, item_id).await?;
        info!("Invoice item deleted");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.stores.invoices.health_check().await
    }
}
