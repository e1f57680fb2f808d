//! Domain models for invoicing-service.

mod directory;
mod invoice;
mod invoice_item;
mod view;

pub use directory::{Business, Customer, Product};
pub use invoice::{settle_paid_date, Invoice, InvoiceWithItems, NewInvoice, UpdateInvoice};
pub use invoice_item::{InvoiceItem, NewInvoiceItem, UpdateInvoiceItem};
pub use view::InvoiceView;
