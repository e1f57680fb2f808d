use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::{CreateInvoiceRequest, NextInvoiceNumberResponse, UpdateInvoiceRequest};
use crate::middleware::UserId;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

pub async fn create_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    ValidatedJson(req): ValidatedJson<CreateInvoiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (invoice, items) = req.into_parts();
    let created = state
        .service
        .create_invoice(&user_id, invoice, items)
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = state.service.get_invoice(&user_id, id).await?;
    Ok(Json(invoice))
}

pub async fn list_business_invoices(
    State(state): State<AppState>,
    user_id: UserId,
    Path(business_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let invoices = state.service.list_invoices(&user_id, business_id).await?;
    Ok(Json(invoices))
}

pub async fn update_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateInvoiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (invoice, items) = req.into_parts();
    state
        .service
        .update_invoice(&user_id, id, invoice, items)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_invoice_status(
    State(state): State<AppState>,
    user_id: UserId,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.service.toggle_status(&user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.service.delete_invoice(&user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn invoice_pdf(
    State(state): State<AppState>,
    user_id: UserId,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let rendered = state.service.render_document(&user_id, id).await?;

    let disposition = format!("inline; filename=\"invoice-{}.pdf\"", id);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        rendered.bytes,
    ))
}

pub async fn next_invoice_number(
    State(state): State<AppState>,
    user_id: UserId,
    Path(business_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let next_invoice_number = state
        .service
        .next_invoice_number(&user_id, business_id)
        .await?;

    Ok(Json(NextInvoiceNumberResponse {
        next_invoice_number,
    }))
}
