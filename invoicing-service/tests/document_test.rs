//! PDF endpoint integration tests for invoicing-service.

mod common;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn pdf_endpoint_returns_a_pdf_document() {
    let app = TestApp::spawn().await;
    let id = app.create_invoice(1).await;

    let response = app.get(&format!("/invoices/{}/pdf", id)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("application/pdf"));
    assert!(response
        .header("content-disposition")
        .map(|v| v.contains(&id.to_string()))
        .unwrap_or(false));
    assert!(response.body.starts_with(b"%PDF"));
}

#[tokio::test]
async fn rendering_is_repeatable() {
    let app = TestApp::spawn().await;
    let id = app.create_invoice(1).await;
    let uri = format!("/invoices/{}/pdf", id);

    let first = app.get(&uri).await;
    let second = app.get(&uri).await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body, second.body);
}

#[tokio::test]
async fn invoice_without_items_still_renders() {
    let app = TestApp::spawn().await;
    let mut body = app.invoice_body(1);
    body["items"] = json!([]);
    let response = app.post("/invoices", body).await;
    let id = common::parse_id(&response.json()["id"]);

    let response = app.get(&format!("/invoices/{}/pdf", id)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.starts_with(b"%PDF"));
}

#[tokio::test]
async fn pdf_of_unknown_invoice_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app.get(&format!("/invoices/{}/pdf", Uuid::new_v4())).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn item_outside_the_business_catalog_fails_to_render() {
    let app = TestApp::spawn().await;
    // The product exists, but belongs to another business's catalog.
    let foreign = common::test_product(Uuid::new_v4());
    let foreign_id = foreign.id;
    app.store.insert_product(foreign).unwrap();

    let mut body = app.invoice_body(1);
    body["items"][0]["product_id"] = json!(foreign_id);
    let response = app.post("/invoices", body).await;
    assert_eq!(response.status, StatusCode::CREATED);
    let id = common::parse_id(&response.json()["id"]);

    let response = app.get(&format!("/invoices/{}/pdf", id)).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json()["error"], "Internal server error");
}

#[tokio::test]
async fn accented_customer_details_render() {
    let app = TestApp::spawn().await;
    let mut customer = common::test_customer(app.business_id);
    customer.name = "Soci\u{e9}t\u{e9} G\u{e9}n\u{e9}rale".to_string();
    customer.billing_address = "Stra\u{df}e 1, M\u{fc}nchen".to_string();
    let customer_id = customer.id;
    app.store.insert_customer(customer).unwrap();

    let mut body = app.invoice_body(1);
    body["customer_id"] = json!(customer_id);
    let id = common::parse_id(&app.post("/invoices", body).await.json()["id"]);

    let first = app.get(&format!("/invoices/{}/pdf", id)).await;
    let second = app.get(&format!("/invoices/{}/pdf", id)).await;

    assert_eq!(first.status, StatusCode::OK);
    assert!(first.body.starts_with(b"%PDF"));
    assert_eq!(first.body, second.body);
}
