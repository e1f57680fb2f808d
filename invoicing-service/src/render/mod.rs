//! Invoice document rendering.
//!
//! Pure and synchronous: takes an assembled [`InvoiceView`](crate::models::InvoiceView)
//! and produces PDF bytes. Callers on the async runtime should move it onto a
//! blocking thread.

mod amounts;
mod document;
mod fonts;

pub use amounts::{format_money, LineAmounts};
pub use document::{render_invoice, RenderError, RenderedInvoice};
