//! Gathers everything the renderer needs for one invoice.

use anyhow::anyhow;
use service_core::error::AppError;
use tracing::instrument;
use uuid::Uuid;

use crate::models::InvoiceView;
use crate::services::repository::Stores;

/// Build the rendering view for `invoice_id`.
///
/// `NotFound` only when the invoice itself is missing. A dangling customer or
/// business reference is an internal inconsistency and surfaces as such; no
/// partial view is ever returned.
#[instrument(skip(stores), fields(invoice_id = %invoice_id))]
pub async fn assemble(stores: &Stores, invoice_id: Uuid) -> Result<InvoiceView, AppError> {
    let invoice = stores.invoices.get_invoice(invoice_id).await?;

    let (items, customer, business, products) = tokio::try_join!(
        stores.items.list_items(invoice_id),
        stores.customers.get_customer(invoice.customer_id),
        stores.businesses.get_business(invoice.business_id),
        stores.products.list_products_by_business(invoice.business_id),
    )
    .map_err(|e| match e {
        AppError::NotFound(inner) => AppError::InternalError(anyhow!(
            "Invoice {} references a missing record: {}",
            invoice_id,
            inner
        )),
        other => other,
    })?;

    Ok(InvoiceView {
        invoice,
        items,
        customer,
        business,
        products,
    })
}
