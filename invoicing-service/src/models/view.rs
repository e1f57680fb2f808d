//! Rendering-ready aggregate of an invoice and everything it references.

use serde::Serialize;

use super::{Business, Customer, Invoice, InvoiceItem, Product};

/// Header, items, customer, business and the business's full product catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceView {
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
    pub customer: Customer,
    pub business: Business,
    pub products: Vec<Product>,
}

impl InvoiceView {
    /// Catalog entry for a product id, by linear scan.
    pub fn product(&self, product_id: uuid::Uuid) -> Option<&Product> {
        self.products.iter().find(|p| p.id == product_id)
    }
}
