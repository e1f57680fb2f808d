//! In-memory store for development and tests.
//!
//! All collections sit behind one lock, so every operation (including
//! replace-all and create-with-items) is observed either fully applied or
//! not at all.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    Business, Customer, Invoice, InvoiceItem, InvoiceWithItems, NewInvoice, NewInvoiceItem,
    Product, UpdateInvoice, UpdateInvoiceItem,
};
use crate::services::repository::{
    require_product_refs, BusinessDirectory, CustomerDirectory, InvoiceItemRepository,
    InvoiceRepository, ProductDirectory,
};

#[derive(Default)]
struct State {
    invoices: HashMap<Uuid, Invoice>,
    items: HashMap<Uuid, Vec<InvoiceItem>>,
    watermarks: HashMap<Uuid, i64>,
    businesses: HashMap<Uuid, Business>,
    customers: HashMap<Uuid, Customer>,
    products: HashMap<Uuid, Product>,
}

impl State {
    fn number_taken(&self, business_id: Uuid, invoice_number: i64) -> bool {
        self.invoices
            .values()
            .any(|inv| inv.business_id == business_id && inv.invoice_number == invoice_number)
    }

    /// The business must exist and the customer must belong to it.
    fn check_parties(&self, business_id: Uuid, customer_id: Uuid) -> Result<(), AppError> {
        if !self.businesses.contains_key(&business_id) {
            return Err(AppError::BadRequest(anyhow!("Unknown business {}", business_id)));
        }
        match self.customers.get(&customer_id) {
            Some(customer) if customer.business_id == business_id => Ok(()),
            _ => Err(AppError::BadRequest(anyhow!(
                "Unknown customer {} for business {}",
                customer_id,
                business_id
            ))),
        }
    }

    fn require_product(&self, product_id: Uuid) -> Result<(), AppError> {
        if self.products.contains_key(&product_id) {
            Ok(())
        } else {
            Err(AppError::BadRequest(anyhow!("Unknown product {}", product_id)))
        }
    }

    fn insert_invoice(&mut self, input: &NewInvoice) -> Result<Invoice, AppError> {
        self.check_parties(input.business_id, input.customer_id)?;
        if self.number_taken(input.business_id, input.invoice_number) {
            return Err(AppError::Conflict(anyhow!(
                "Invoice number {} already exists for this business",
                input.invoice_number
            )));
        }

        let now = Utc::now();
        let input = input.clone().settled(now);
        let invoice = Invoice {
            id: Uuid::new_v4(),
            invoice_number: input.invoice_number,
            business_id: input.business_id,
            customer_id: input.customer_id,
            total_amount: input.total_amount,
            invoice_date: input.invoice_date,
            due_date: input.due_date,
            is_paid: input.is_paid,
            paid_date: input.paid_date,
            created_at: now,
        };

        let mark = self.watermarks.entry(invoice.business_id).or_insert(0);
        *mark = (*mark).max(invoice.invoice_number);
        self.invoices.insert(invoice.id, invoice.clone());

        Ok(invoice)
    }

    /// Every item must name a product that exists.
    fn check_items(&self, items: &[NewInvoiceItem]) -> Result<Vec<Uuid>, AppError> {
        let product_ids = require_product_refs(items)?;
        for product_id in &product_ids {
            self.require_product(*product_id)?;
        }
        Ok(product_ids)
    }

    fn build_items(
        &self,
        invoice_id: Uuid,
        items: &[NewInvoiceItem],
        first_sort_order: i32,
    ) -> Result<Vec<InvoiceItem>, AppError> {
        let product_ids = self.check_items(items)?;
        Ok(items
            .iter()
            .zip(product_ids)
            .zip(first_sort_order..)
            .map(|((item, product_id), sort_order)| InvoiceItem {
                id: Uuid::new_v4(),
                invoice_id,
                product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                sort_order,
            })
            .collect())
    }

    fn require_invoice(&self, invoice_id: Uuid) -> Result<&Invoice, AppError> {
        self.invoices
            .get(&invoice_id)
            .ok_or_else(|| AppError::NotFound(anyhow!("Invoice {} not found", invoice_id)))
    }

    /// Apply a header update after checking the new customer.
    fn apply_update(&mut self, id: Uuid, input: &UpdateInvoice) -> Result<Invoice, AppError> {
        let business_id = self.require_invoice(id)?.business_id;
        self.check_parties(business_id, input.customer_id)?;

        let input = input.clone().settled(Utc::now());
        let invoice = self
            .invoices
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(anyhow!("Invoice {} not found", id)))?;
        invoice.customer_id = input.customer_id;
        invoice.total_amount = input.total_amount;
        invoice.invoice_date = input.invoice_date;
        invoice.due_date = input.due_date;
        invoice.is_paid = input.is_paid;
        invoice.paid_date = input.paid_date;

        Ok(invoice.clone())
    }

    /// Build the replacement set first; the stored items change only if it is valid.
    fn swap_items(
        &mut self,
        invoice_id: Uuid,
        items: &[NewInvoiceItem],
    ) -> Result<Vec<InvoiceItem>, AppError> {
        if items.is_empty() {
            return Ok(self.sorted_items(invoice_id));
        }
        let replacement = self.build_items(invoice_id, items, 0)?;
        self.items.insert(invoice_id, replacement.clone());
        Ok(replacement)
    }

    fn sorted_items(&self, invoice_id: Uuid) -> Vec<InvoiceItem> {
        let mut items = self.items.get(&invoice_id).cloned().unwrap_or_default();
        items.sort_by_key(|i| i.sort_order);
        items
    }
}

fn item_not_found(item_id: Uuid) -> AppError {
    AppError::NotFound(anyhow!("Invoice item {} not found", item_id))
}

/// Thread-safe in-memory implementation of every storage trait.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, AppError> {
        self.state
            .read()
            .map_err(|e| AppError::DatabaseError(anyhow!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, AppError> {
        self.state
            .write()
            .map_err(|e| AppError::DatabaseError(anyhow!("Failed to acquire write lock: {}", e)))
    }

    /// Seed a business record.
    pub fn insert_business(&self, business: Business) -> Result<(), AppError> {
        self.write()?.businesses.insert(business.id, business);
        Ok(())
    }

    /// Seed a customer record.
    pub fn insert_customer(&self, customer: Customer) -> Result<(), AppError> {
        self.write()?.customers.insert(customer.id, customer);
        Ok(())
    }

    /// Seed a product record.
    pub fn insert_product(&self, product: Product) -> Result<(), AppError> {
        self.write()?.products.insert(product.id, product);
        Ok(())
    }
}

#[async_trait]
impl InvoiceRepository for MemoryStore {
    async fn next_invoice_number(&self, business_id: Uuid) -> Result<i64, AppError> {
        let state = self.read()?;
        let highest = state
            .invoices
            .values()
            .filter(|inv| inv.business_id == business_id)
            .map(|inv| inv.invoice_number)
            .max()
            .unwrap_or(0);
        let mark = state.watermarks.get(&business_id).copied().unwrap_or(0);
        Ok(highest.max(mark) + 1)
    }

    async fn create_invoice(&self, input: &NewInvoice) -> Result<Invoice, AppError> {
        self.write()?.insert_invoice(input)
    }

    async fn create_invoice_with_items(
        &self,
        input: &NewInvoice,
        items: &[NewInvoiceItem],
    ) -> Result<InvoiceWithItems, AppError> {
        let mut state = self.write()?;
        // Validate items before touching state so a rejection leaves nothing behind.
        state.check_items(items)?;
        let invoice = state.insert_invoice(input)?;
        let items = state.build_items(invoice.id, items, 0)?;
        state.items.insert(invoice.id, items.clone());
        Ok(InvoiceWithItems { invoice, items })
    }

    async fn get_invoice(&self, id: Uuid) -> Result<Invoice, AppError> {
        Ok(self.read()?.require_invoice(id)?.clone())
    }

    async fn list_invoices_by_business(
        &self,
        business_id: Uuid,
    ) -> Result<Vec<Invoice>, AppError> {
        Ok(self
            .read()?
            .invoices
            .values()
            .filter(|inv| inv.business_id == business_id)
            .cloned()
            .collect())
    }

    async fn update_invoice(&self, id: Uuid, input: &UpdateInvoice) -> Result<Invoice, AppError> {
        self.write()?.apply_update(id, input)
    }

    async fn update_invoice_with_items(
        &self,
        id: Uuid,
        input: &UpdateInvoice,
        items: &[NewInvoiceItem],
    ) -> Result<InvoiceWithItems, AppError> {
        let mut state = self.write()?;
        // Check everything that can fail before the header changes.
        let business_id = state.require_invoice(id)?.business_id;
        state.check_parties(business_id, input.customer_id)?;
        state.check_items(items)?;

        let invoice = state.apply_update(id, input)?;
        let items = state.swap_items(id, items)?;
        Ok(InvoiceWithItems { invoice, items })
    }

    async fn toggle_invoice_status(&self, id: Uuid) -> Result<Invoice, AppError> {
        let mut state = self.write()?;
        let invoice = state
            .invoices
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(anyhow!("Invoice {} not found", id)))?;

        invoice.is_paid = !invoice.is_paid;
        invoice.paid_date = invoice.is_paid.then(Utc::now);

        Ok(invoice.clone())
    }

    async fn delete_invoice(&self, id: Uuid) -> Result<(), AppError> {
        let mut state = self.write()?;
        state
            .invoices
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(anyhow!("Invoice {} not found", id)))?;
        state.items.remove(&id);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.read().map(|_| ())
    }
}

#[async_trait]
impl InvoiceItemRepository for MemoryStore {
    async fn create_item(
        &self,
        invoice_id: Uuid,
        input: &NewInvoiceItem,
    ) -> Result<InvoiceItem, AppError> {
        let mut state = self.write()?;
        state.require_invoice(invoice_id)?;

        let next_order = state
            .items
            .get(&invoice_id)
            .and_then(|items| items.iter().map(|i| i.sort_order + 1).max())
            .unwrap_or(0);
        let mut created = state.build_items(invoice_id, std::slice::from_ref(input), next_order)?;
        let item = created.remove(0);
        state.items.entry(invoice_id).or_default().push(item.clone());

        Ok(item)
    }

    async fn get_item(&self, invoice_id: Uuid, item_id: Uuid) -> Result<InvoiceItem, AppError> {
        self.read()?
            .items
            .get(&invoice_id)
            .and_then(|items| items.iter().find(|i| i.id == item_id))
            .cloned()
            .ok_or_else(|| item_not_found(item_id))
    }

    async fn list_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, AppError> {
        Ok(self.read()?.sorted_items(invoice_id))
    }

    async fn update_item(
        &self,
        invoice_id: Uuid,
        item_id: Uuid,
        input: &UpdateInvoiceItem,
    ) -> Result<InvoiceItem, AppError> {
        let mut state = self.write()?;
        let known = state
            .items
            .get(&invoice_id)
            .is_some_and(|items| items.iter().any(|i| i.id == item_id));
        if !known {
            return Err(item_not_found(item_id));
        }
        state.require_product(input.product_id)?;

        let item = state
            .items
            .get_mut(&invoice_id)
            .and_then(|items| items.iter_mut().find(|i| i.id == item_id))
            .ok_or_else(|| item_not_found(item_id))?;

        item.product_id = input.product_id;
        item.quantity = input.quantity;
        item.unit_price = input.unit_price;

        Ok(item.clone())
    }

    async fn delete_item(&self, invoice_id: Uuid, item_id: Uuid) -> Result<(), AppError> {
        let mut state = self.write()?;
        let items = state
            .items
            .get_mut(&invoice_id)
            .ok_or_else(|| item_not_found(item_id))?;
        let before = items.len();
        items.retain(|i| i.id != item_id);
        if items.len() == before {
            return Err(item_not_found(item_id));
        }
        Ok(())
    }

    async fn replace_items(
        &self,
        invoice_id: Uuid,
        items: &[NewInvoiceItem],
    ) -> Result<Vec<InvoiceItem>, AppError> {
        let mut state = self.write()?;
        state.require_invoice(invoice_id)?;
        state.swap_items(invoice_id, items)
    }
}

#[async_trait]
impl BusinessDirectory for MemoryStore {
    async fn get_business(&self, id: Uuid) -> Result<Business, AppError> {
        self.read()?
            .businesses
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(anyhow!("Business {} not found", id)))
    }
}

#[async_trait]
impl CustomerDirectory for MemoryStore {
    async fn get_customer(&self, id: Uuid) -> Result<Customer, AppError> {
        self.read()?
            .customers
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(anyhow!("Customer {} not found", id)))
    }
}

#[async_trait]
impl ProductDirectory for MemoryStore {
    async fn list_products_by_business(
        &self,
        business_id: Uuid,
    ) -> Result<Vec<Product>, AppError> {
        let mut products: Vec<Product> = self
            .read()?
            .products
            .values()
            .filter(|p| p.business_id == business_id)
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }
}
