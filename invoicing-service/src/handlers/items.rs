use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::InvoiceItemPayload;
use crate::middleware::UserId;
use crate::models::{NewInvoiceItem, UpdateInvoiceItem};
use crate::startup::AppState;
use crate::utils::ValidatedJson;

pub async fn add_item(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<InvoiceItemPayload>,
) -> Result<impl IntoResponse, AppError> {
    let item = state
        .service
        .add_item(&user_id, invoice_id, NewInvoiceItem::from(&req))
        .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn list_items(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let items = state.service.list_items(&user_id, invoice_id).await?;
    Ok(Json(items))
}

pub async fn get_item(
    State(state): State<AppState>,
    user_id: UserId,
    Path((invoice_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let item = state.service.get_item(&user_id, invoice_id, item_id).await?;
    Ok(Json(item))
}

pub async fn update_item(
    State(state): State<AppState>,
    user_id: UserId,
    Path((invoice_id, item_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(req): ValidatedJson<InvoiceItemPayload>,
) -> Result<impl IntoResponse, AppError> {
    let item = state
        .service
        .update_item(&user_id, invoice_id, item_id, UpdateInvoiceItem::from(&req))
        .await?;

    Ok(Json(item))
}

pub async fn delete_item(
    State(state): State<AppState>,
    user_id: UserId,
    Path((invoice_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    state
        .service
        .delete_item(&user_id, invoice_id, item_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
