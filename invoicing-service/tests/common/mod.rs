//! Test helper module for invoicing-service integration tests.
//!
//! Drives the full router over a seeded in-memory store.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use invoicing_service::config::InvoicingConfig;
use invoicing_service::middleware::USER_ID_HEADER;
use invoicing_service::models::{Business, Customer, Product};
use invoicing_service::services::{init_metrics, MemoryStore, Stores};
use invoicing_service::{build_router, AppState};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_USER_ID: &str = "user-42";

/// Response with the body already collected.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("Response body is not JSON")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Test application wrapper for integration tests.
pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub business_id: Uuid,
    pub customer_id: Uuid,
    pub product_id: Uuid,
}

impl TestApp {
    /// Build a router over a store seeded with one business, customer and product.
    pub async fn spawn() -> Self {
        init_metrics();

        let store = MemoryStore::new();
        let business = test_business();
        let customer = test_customer(business.id);
        let product = test_product(business.id);

        let business_id = business.id;
        let customer_id = customer.id;
        let product_id = product.id;

        store.insert_business(business).expect("Failed to seed business");
        store.insert_customer(customer).expect("Failed to seed customer");
        store.insert_product(product).expect("Failed to seed product");

        let state = AppState::new(InvoicingConfig::in_memory(), Stores::in_memory(store.clone()));

        Self {
            router: build_router(state),
            store,
            business_id,
            customer_id,
            product_id,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_ID_HEADER, TEST_USER_ID);
        self.send(builder, body).await
    }

    /// Same as `request` but without the caller identity header.
    pub async fn anonymous(&self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        self.send(Request::builder().method(method).uri(uri), body)
            .await
    }

    async fn send(&self, builder: axum::http::request::Builder, body: Option<Value>) -> TestResponse {
        let request = match body {
            Some(value) => builder
                .header("content-type", "application/json")
                .body(Body::from(value.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response: Response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");

        TestResponse {
            status,
            headers,
            body: body.to_vec(),
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, Some(body)).await
    }

    pub async fn patch(&self, uri: &str) -> TestResponse {
        self.request(Method::PATCH, uri, None).await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.request(Method::DELETE, uri, None).await
    }

    /// Create-invoice body for the seeded business and customer with one item.
    pub fn invoice_body(&self, invoice_number: i64) -> Value {
        json!({
            "invoice_number": invoice_number,
            "business_id": self.business_id,
            "customer_id": self.customer_id,
            "total_amount": "236.00",
            "invoice_date": "2024-05-01",
            "due_date": "2024-05-31",
            "items": [
                { "product_id": self.product_id, "quantity": 2, "unit_price": "100.00" }
            ]
        })
    }

    /// Create an invoice and return its id.
    pub async fn create_invoice(&self, invoice_number: i64) -> Uuid {
        let response = self.post("/invoices", self.invoice_body(invoice_number)).await;
        assert_eq!(response.status, StatusCode::CREATED);
        parse_id(&response.json()["id"])
    }
}

pub fn parse_id(value: &Value) -> Uuid {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .expect("Expected a UUID string")
}

pub fn test_business() -> Business {
    Business {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        name: "Acme Traders".to_string(),
        gst_number: "29ABCDE1234F1Z5".to_string(),
        company_email: "billing@acme.test".to_string(),
        company_phone: "+91 80 1234 5678".to_string(),
        address: "12 MG Road".to_string(),
        city: "Bengaluru".to_string(),
        zip_code: "560001".to_string(),
        state: "Karnataka".to_string(),
        country: "India".to_string(),
        bank_name: "State Bank".to_string(),
        account_number: "000123456789".to_string(),
        ifsc: "SBIN0000001".to_string(),
        bank_branch: "MG Road".to_string(),
    }
}

pub fn test_customer(business_id: Uuid) -> Customer {
    Customer {
        id: Uuid::new_v4(),
        business_id,
        name: "Globex Retail".to_string(),
        gst_number: "27PQRSX5678L1Z2".to_string(),
        email: "accounts@globex.test".to_string(),
        phone: "+91 22 8765 4321".to_string(),
        billing_address: "4 Marine Drive\nMumbai 400002".to_string(),
        shipping_address: "Warehouse 7, Bhiwandi".to_string(),
    }
}

pub fn test_product(business_id: Uuid) -> Product {
    Product {
        id: Uuid::new_v4(),
        business_id,
        name: "Steel Bracket".to_string(),
        price: dec!(100.00),
        tax_rate: dec!(18),
        unit: "pcs".to_string(),
        hsn_code: "7326".to_string(),
    }
}
