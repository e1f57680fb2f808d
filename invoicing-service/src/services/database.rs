//! Database service for invoicing-service.

use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{PgConnection, PgExecutor};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    Business, Customer, Invoice, InvoiceItem, InvoiceWithItems, NewInvoice, NewInvoiceItem,
    Product, UpdateInvoice, UpdateInvoiceItem,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::repository::{
    require_product_refs, BusinessDirectory, CustomerDirectory, InvoiceItemRepository,
    InvoiceRepository, ProductDirectory,
};

const INVOICE_COLUMNS: &str = "id, invoice_number, business_id, customer_id, total_amount, \
     invoice_date, due_date, is_paid, paid_date, created_at";

const ITEM_COLUMNS: &str = "id, invoice_id, product_id, quantity, unit_price, sort_order";

fn db_error(context: &str, e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow!("{}: {}", context, e))
}

fn invoice_not_found(id: Uuid) -> AppError {
    AppError::NotFound(anyhow!("Invoice {} not found", id))
}

fn item_not_found(id: Uuid) -> AppError {
    AppError::NotFound(anyhow!("Invoice item {} not found", id))
}

fn unknown_parties(business_id: Uuid, customer_id: Uuid) -> AppError {
    AppError::BadRequest(anyhow!(
        "Unknown business {} or customer {} of that business",
        business_id,
        customer_id
    ))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    query_timeout: Duration,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "invoicing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        query_timeout: Duration,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            query_timeout_secs = query_timeout.as_secs(),
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| db_error("Failed to connect", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self {
            pool,
            query_timeout,
        })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Run one data-access step under the query timeout, recording its duration.
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>> + Send,
    {
        let timer = DB_QUERY_DURATION
            .with_label_values(&[operation])
            .start_timer();

        let result = tokio::time::timeout(self.query_timeout, fut)
            .await
            .map_err(|_| {
                warn!(operation, "Query timed out");
                AppError::DatabaseError(anyhow!(
                    "{} timed out after {}s",
                    operation,
                    self.query_timeout.as_secs()
                ))
            })?;

        timer.observe_duration();
        result
    }
}

// -----------------------------------------------------------------------------
// Statement helpers shared by pooled and transactional paths
// -----------------------------------------------------------------------------

async fn insert_header(conn: &mut PgConnection, input: &NewInvoice) -> Result<Invoice, AppError> {
    let input = input.clone().settled(chrono::Utc::now());

    let invoice = sqlx::query_as::<_, Invoice>(&format!(
        r#"
        INSERT INTO invoices (id, invoice_number, business_id, customer_id, total_amount,
                              invoice_date, due_date, is_paid, paid_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {INVOICE_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(input.invoice_number)
    .bind(input.business_id)
    .bind(input.customer_id)
    .bind(input.total_amount)
    .bind(input.invoice_date)
    .bind(input.due_date)
    .bind(input.is_paid)
    .bind(input.paid_date)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(anyhow!(
                "Invoice number {} already exists for this business",
                input.invoice_number
            ))
        }
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            unknown_parties(input.business_id, input.customer_id)
        }
        _ => db_error("Failed to create invoice", e),
    })?;

    sqlx::query(
        r#"
        INSERT INTO invoice_number_watermarks (business_id, last_number)
        VALUES ($1, $2)
        ON CONFLICT (business_id)
        DO UPDATE SET last_number = GREATEST(invoice_number_watermarks.last_number, EXCLUDED.last_number)
        "#,
    )
    .bind(invoice.business_id)
    .bind(invoice.invoice_number)
    .execute(&mut *conn)
    .await
    .map_err(|e| db_error("Failed to record invoice number", e))?;

    Ok(invoice)
}

async fn insert_items(
    conn: &mut PgConnection,
    invoice_id: Uuid,
    items: &[NewInvoiceItem],
    first_sort_order: i32,
) -> Result<Vec<InvoiceItem>, AppError> {
    let product_ids = require_product_refs(items)?;
    let mut created = Vec::with_capacity(items.len());

    for ((item, product_id), sort_order) in items.iter().zip(product_ids).zip(first_sort_order..) {
        let row = sqlx::query_as::<_, InvoiceItem>(&format!(
            r#"
            INSERT INTO invoice_items (id, invoice_id, product_id, quantity, unit_price, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(invoice_id)
        .bind(product_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(sort_order)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AppError::BadRequest(anyhow!("Unknown product {}", product_id))
            }
            _ => db_error("Failed to create invoice item", e),
        })?;
        created.push(row);
    }

    Ok(created)
}

/// Overwrite the header fields; `None` when the invoice does not exist.
async fn update_header<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
    input: &UpdateInvoice,
) -> Result<Option<Invoice>, AppError> {
    let input = input.clone().settled(chrono::Utc::now());

    sqlx::query_as::<_, Invoice>(&format!(
        r#"
        UPDATE invoices
        SET customer_id = $2,
            total_amount = $3,
            invoice_date = $4,
            due_date = $5,
            is_paid = $6,
            paid_date = $7
        WHERE id = $1
        RETURNING {INVOICE_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(input.customer_id)
    .bind(input.total_amount)
    .bind(input.invoice_date)
    .bind(input.due_date)
    .bind(input.is_paid)
    .bind(input.paid_date)
    .fetch_optional(executor)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            AppError::BadRequest(anyhow!(
                "Customer {} does not belong to the invoice's business",
                input.customer_id
            ))
        }
        _ => db_error("Failed to update invoice", e),
    })
}

async fn fetch_items<'e, E: PgExecutor<'e>>(
    executor: E,
    invoice_id: Uuid,
) -> Result<Vec<InvoiceItem>, AppError> {
    sqlx::query_as::<_, InvoiceItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM invoice_items WHERE invoice_id = $1 ORDER BY sort_order"
    ))
    .bind(invoice_id)
    .fetch_all(executor)
    .await
    .map_err(|e| db_error("Failed to list invoice items", e))
}

/// Delete every item of a locked invoice and insert `items` in their place.
/// Must run inside a transaction; an empty `items` keeps the current rows.
async fn swap_item_rows(
    conn: &mut PgConnection,
    invoice_id: Uuid,
    items: &[NewInvoiceItem],
) -> Result<Vec<InvoiceItem>, AppError> {
    if items.is_empty() {
        return fetch_items(&mut *conn, invoice_id).await;
    }

    sqlx::query("DELETE FROM invoice_items WHERE invoice_id = $1")
        .bind(invoice_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("Failed to clear invoice items", e))?;

    insert_items(conn, invoice_id, items, 0).await
}

/// Lock the invoice row for the rest of the transaction.
async fn lock_invoice(conn: &mut PgConnection, invoice_id: Uuid) -> Result<(), AppError> {
    sqlx::query("SELECT id FROM invoices WHERE id = $1 FOR UPDATE")
        .bind(invoice_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_error("Failed to lock invoice", e))?
        .map(|_| ())
        .ok_or_else(|| invoice_not_found(invoice_id))
}

// -----------------------------------------------------------------------------
// Invoice Operations
// -----------------------------------------------------------------------------

#[async_trait]
impl InvoiceRepository for Database {
    #[instrument(skip(self), fields(business_id = %business_id))]
    async fn next_invoice_number(&self, business_id: Uuid) -> Result<i64, AppError> {
        self.bounded("next_invoice_number", async {
            sqlx::query_scalar::<_, i64>(
                r#"
                SELECT GREATEST(
                    COALESCE((SELECT MAX(invoice_number) FROM invoices WHERE business_id = $1), 0),
                    COALESCE((SELECT last_number FROM invoice_number_watermarks WHERE business_id = $1), 0)
                ) + 1
                "#,
            )
            .bind(business_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to compute next invoice number", e))
        })
        .await
    }

    #[instrument(skip(self, input), fields(business_id = %input.business_id, invoice_number = input.invoice_number))]
    async fn create_invoice(&self, input: &NewInvoice) -> Result<Invoice, AppError> {
        let invoice = self
            .bounded("create_invoice", async {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| db_error("Failed to begin transaction", e))?;
                let invoice = insert_header(&mut *tx, input).await?;
                tx.commit()
                    .await
                    .map_err(|e| db_error("Failed to commit invoice", e))?;
                Ok(invoice)
            })
            .await?;

        info!(invoice_id = %invoice.id, "Invoice created");
        Ok(invoice)
    }

    #[instrument(skip(self, input, items), fields(business_id = %input.business_id, invoice_number = input.invoice_number, item_count = items.len()))]
    async fn create_invoice_with_items(
        &self,
        input: &NewInvoice,
        items: &[NewInvoiceItem],
    ) -> Result<InvoiceWithItems, AppError> {
        require_product_refs(items)?;

        let created = self
            .bounded("create_invoice_with_items", async {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| db_error("Failed to begin transaction", e))?;
                let invoice = insert_header(&mut *tx, input).await?;
                let items = insert_items(&mut *tx, invoice.id, items, 0).await?;
                tx.commit()
                    .await
                    .map_err(|e| db_error("Failed to commit invoice", e))?;
                Ok(InvoiceWithItems { invoice, items })
            })
            .await?;

        info!(invoice_id = %created.invoice.id, "Invoice created with items");
        Ok(created)
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn get_invoice(&self, id: Uuid) -> Result<Invoice, AppError> {
        self.bounded("get_invoice", async {
            sqlx::query_as::<_, Invoice>(&format!(
                "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to get invoice", e))?
            .ok_or_else(|| invoice_not_found(id))
        })
        .await
    }

    #[instrument(skip(self), fields(business_id = %business_id))]
    async fn list_invoices_by_business(
        &self,
        business_id: Uuid,
    ) -> Result<Vec<Invoice>, AppError> {
        self.bounded("list_invoices_by_business", async {
            sqlx::query_as::<_, Invoice>(&format!(
                "SELECT {INVOICE_COLUMNS} FROM invoices WHERE business_id = $1"
            ))
            .bind(business_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list invoices", e))
        })
        .await
    }

    #[instrument(skip(self, input), fields(invoice_id = %id))]
    async fn update_invoice(&self, id: Uuid, input: &UpdateInvoice) -> Result<Invoice, AppError> {
        let invoice = self
            .bounded("update_invoice", async {
                update_header(&self.pool, id, input)
                    .await?
                    .ok_or_else(|| invoice_not_found(id))
            })
            .await?;

        info!("Invoice updated");
        Ok(invoice)
    }

    #[instrument(skip(self, input, items), fields(invoice_id = %id, item_count = items.len()))]
    async fn update_invoice_with_items(
        &self,
        id: Uuid,
        input: &UpdateInvoice,
        items: &[NewInvoiceItem],
    ) -> Result<InvoiceWithItems, AppError> {
        require_product_refs(items)?;

        let updated = self
            .bounded("update_invoice_with_items", async {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| db_error("Failed to begin transaction", e))?;
                lock_invoice(&mut *tx, id).await?;

                let invoice = update_header(&mut *tx, id, input)
                    .await?
                    .ok_or_else(|| invoice_not_found(id))?;
                let items = swap_item_rows(&mut *tx, id, items).await?;
                tx.commit()
                    .await
                    .map_err(|e| db_error("Failed to commit invoice update", e))?;
                Ok(InvoiceWithItems { invoice, items })
            })
            .await?;

        info!(item_count = updated.items.len(), "Invoice updated with items");
        Ok(updated)
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn toggle_invoice_status(&self, id: Uuid) -> Result<Invoice, AppError> {
        let invoice = self
            .bounded("toggle_invoice_status", async {
                sqlx::query_as::<_, Invoice>(&format!(
                    r#"
                    UPDATE invoices
                    SET is_paid = NOT is_paid,
                        paid_date = CASE WHEN is_paid THEN NULL ELSE NOW() END
                    WHERE id = $1
                    RETURNING {INVOICE_COLUMNS}
                    "#
                ))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to update invoice status", e))?
                .ok_or_else(|| invoice_not_found(id))
            })
            .await?;

        info!(is_paid = invoice.is_paid, "Invoice status toggled");
        Ok(invoice)
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn delete_invoice(&self, id: Uuid) -> Result<(), AppError> {
        self.bounded("delete_invoice", async {
            let result = sqlx::query("DELETE FROM invoices WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("Failed to delete invoice", e))?;

            if result.rows_affected() == 0 {
                return Err(invoice_not_found(id));
            }
            Ok(())
        })
        .await?;

        info!("Invoice deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        self.bounded("health_check", async {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("Health check failed", e))?;
            Ok(())
        })
        .await
    }
}

// -----------------------------------------------------------------------------
// Invoice Item Operations
// -----------------------------------------------------------------------------

#[async_trait]
impl InvoiceItemRepository for Database {
    #[instrument(skip(self, input), fields(invoice_id = %invoice_id))]
    async fn create_item(
        &self,
        invoice_id: Uuid,
        input: &NewInvoiceItem,
    ) -> Result<InvoiceItem, AppError> {
        self.bounded("create_item", async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| db_error("Failed to begin transaction", e))?;
            lock_invoice(&mut *tx, invoice_id).await?;

            let next_order = sqlx::query_scalar::<_, i32>(
                "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM invoice_items WHERE invoice_id = $1",
            )
            .bind(invoice_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to read item order", e))?;

            let mut created =
                insert_items(&mut *tx, invoice_id, std::slice::from_ref(input), next_order).await?;
            tx.commit()
                .await
                .map_err(|e| db_error("Failed to commit invoice item", e))?;

            created
                .pop()
                .ok_or_else(|| AppError::DatabaseError(anyhow!("Item insert returned no row")))
        })
        .await
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id, item_id = %item_id))]
    async fn get_item(&self, invoice_id: Uuid, item_id: Uuid) -> Result<InvoiceItem, AppError> {
        self.bounded("get_item", async {
            sqlx::query_as::<_, InvoiceItem>(&format!(
                "SELECT {ITEM_COLUMNS} FROM invoice_items WHERE invoice_id = $1 AND id = $2"
            ))
            .bind(invoice_id)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to get invoice item", e))?
            .ok_or_else(|| item_not_found(item_id))
        })
        .await
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn list_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, AppError> {
        self.bounded("list_items", fetch_items(&self.pool, invoice_id))
            .await
    }

    #[instrument(skip(self, input), fields(invoice_id = %invoice_id, item_id = %item_id))]
    async fn update_item(
        &self,
        invoice_id: Uuid,
        item_id: Uuid,
        input: &UpdateInvoiceItem,
    ) -> Result<InvoiceItem, AppError> {
        self.bounded("update_item", async {
            sqlx::query_as::<_, InvoiceItem>(&format!(
                r#"
                UPDATE invoice_items
                SET product_id = $3, quantity = $4, unit_price = $5
                WHERE invoice_id = $1 AND id = $2
                RETURNING {ITEM_COLUMNS}
                "#
            ))
            .bind(invoice_id)
            .bind(item_id)
            .bind(input.product_id)
            .bind(input.quantity)
            .bind(input.unit_price)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                    AppError::BadRequest(anyhow!("Unknown product {}", input.product_id))
                }
                _ => db_error("Failed to update invoice item", e),
            })?
            .ok_or_else(|| item_not_found(item_id))
        })
        .await
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id, item_id = %item_id))]
    async fn delete_item(&self, invoice_id: Uuid, item_id: Uuid) -> Result<(), AppError> {
        self.bounded("delete_item", async {
            let result =
                sqlx::query("DELETE FROM invoice_items WHERE invoice_id = $1 AND id = $2")
                    .bind(invoice_id)
                    .bind(item_id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| db_error("Failed to delete invoice item", e))?;

            if result.rows_affected() == 0 {
                return Err(item_not_found(item_id));
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, items), fields(invoice_id = %invoice_id, item_count = items.len()))]
    async fn replace_items(
        &self,
        invoice_id: Uuid,
        items: &[NewInvoiceItem],
    ) -> Result<Vec<InvoiceItem>, AppError> {
        require_product_refs(items)?;

        let replaced = self
            .bounded("replace_items", async {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| db_error("Failed to begin transaction", e))?;
                lock_invoice(&mut *tx, invoice_id).await?;

                // Any failure below drops the transaction, which rolls it back.
                let created = swap_item_rows(&mut *tx, invoice_id, items).await?;
                tx.commit()
                    .await
                    .map_err(|e| db_error("Failed to commit invoice items", e))?;
                Ok(created)
            })
            .await?;

        info!(item_count = replaced.len(), "Invoice items replaced");
        Ok(replaced)
    }
}

// -----------------------------------------------------------------------------
// Directory Lookups
// -----------------------------------------------------------------------------

#[async_trait]
impl BusinessDirectory for Database {
    #[instrument(skip(self), fields(business_id = %id))]
    async fn get_business(&self, id: Uuid) -> Result<Business, AppError> {
        self.bounded("get_business", async {
            sqlx::query_as::<_, Business>(
                r#"
                SELECT id, user_id, name, gst_number, company_email, company_phone, address,
                       city, zip_code, state, country, bank_name, account_number, ifsc, bank_branch
                FROM businesses
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to get business", e))?
            .ok_or_else(|| AppError::NotFound(anyhow!("Business {} not found", id)))
        })
        .await
    }
}

const CUSTOMER_COLUMNS: &str =
    "id, business_id, name, gst_number, email, phone, billing_address, shipping_address";

#[async_trait]
impl CustomerDirectory for Database {
    #[instrument(skip(self), fields(customer_id = %id))]
    async fn get_customer(&self, id: Uuid) -> Result<Customer, AppError> {
        self.bounded("get_customer", async {
            sqlx::query_as::<_, Customer>(&format!(
                "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to get customer", e))?
            .ok_or_else(|| AppError::NotFound(anyhow!("Customer {} not found", id)))
        })
        .await
    }
}

const PRODUCT_COLUMNS: &str = "id, business_id, name, price, tax_rate, unit, hsn_code";

#[async_trait]
impl ProductDirectory for Database {
    #[instrument(skip(self), fields(business_id = %business_id))]
    async fn list_products_by_business(
        &self,
        business_id: Uuid,
    ) -> Result<Vec<Product>, AppError> {
        self.bounded("list_products_by_business", async {
            sqlx::query_as::<_, Product>(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM products WHERE business_id = $1 ORDER BY name"
            ))
            .bind(business_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list products", e))
        })
        .await
    }
}
