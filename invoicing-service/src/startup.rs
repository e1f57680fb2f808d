//! Application startup and lifecycle management.

use std::future::Future;
use std::net::SocketAddr;

use axum::middleware::from_fn;
use axum::{
    routing::{get, patch, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    request_id_middleware, security_headers_middleware, REQUEST_ID_HEADER,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::{InvoicingConfig, StoreBackend};
use crate::handlers::{health, invoices, items};
use crate::middleware::http_metrics_middleware;
use crate::services::{Database, InvoiceService, MemoryStore, Stores};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: InvoicingConfig,
    pub service: InvoiceService,
}

impl AppState {
    pub fn new(config: InvoicingConfig, stores: Stores) -> Self {
        Self {
            config,
            service: InvoiceService::new(stores),
        }
    }
}

/// Connect the configured store, running migrations when asked to.
pub async fn connect_stores(config: &InvoicingConfig) -> Result<Stores, AppError> {
    match config.store {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Ok(Stores::in_memory(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let db_config = config.database.as_ref().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("Database configuration missing"))
            })?;

            let db = Database::new(
                db_config.url.expose_secret(),
                db_config.max_connections,
                db_config.min_connections,
                db_config.query_timeout,
            )
            .await?;

            if db_config.run_migrations {
                db.run_migrations().await?;
            }

            Ok(Stores::postgres(db))
        }
    }
}

/// Full HTTP surface over the given state.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/invoices", post(invoices::create_invoice))
        .route(
            "/invoices/:id",
            get(invoices::get_invoice)
                .put(invoices::update_invoice)
                .delete(invoices::delete_invoice),
        )
        .route("/invoices/:id/status", patch(invoices::toggle_invoice_status))
        .route("/invoices/:id/pdf", get(invoices::invoice_pdf))
        .route(
            "/invoices/:id/items",
            post(items::add_item).get(items::list_items),
        )
        .route(
            "/invoices/:id/items/:item_id",
            get(items::get_item)
                .put(items::update_item)
                .delete(items::delete_item),
        )
        .route(
            "/businesses/:business_id/invoices",
            get(invoices::list_business_invoices),
        )
        .route(
            "/businesses/:business_id/invoices/next-number",
            get(invoices::next_invoice_number),
        )
        .route_layer(from_fn(http_metrics_middleware));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics_endpoint))
        .route("/ready", get(health::readiness_check))
        .merge(api)
        .layer(from_fn(security_headers_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                    user_id = tracing::field::Empty,
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: InvoicingConfig) -> Result<Self, AppError> {
        let stores = connect_stores(&config).await?;
        let state = AppState::new(config.clone(), stores);

        // Port 0 picks a random port for tests.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port, store = ?config.store, "Invoicing service listening");

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run_until_stopped<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
