pub mod assembly;
pub mod database;
pub mod invoices;
pub mod memory;
pub mod metrics;
pub mod repository;

pub use database::Database;
pub use invoices::InvoiceService;
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use repository::{
    BusinessDirectory, CustomerDirectory, InvoiceItemRepository, InvoiceRepository,
    ProductDirectory, Stores,
};
