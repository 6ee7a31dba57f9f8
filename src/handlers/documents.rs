// src/handlers/documents.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AppState,
    models::documents::{DocumentKind, PaymentMethod},
    services::document_service::{CreateDocumentCommand, LineCommand},
};

// ---
// Payloads
// ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinePayload {
    pub medicine_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Option<Decimal>,
    pub unit_cost: Option<Decimal>,
    pub expiry_date: Option<NaiveDate>,
    pub barcode: Option<String>,
    pub origin_line_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentPayload {
    pub partner_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub payment_method: PaymentMethod,
    pub origin_document_id: Option<Uuid>,
    pub notes: Option<String>,
    // Identificador do usuário chamador (a autenticação fica fora do núcleo).
    pub created_by: String,
    pub lines: Vec<LinePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionPayload {
    pub user: String,
}

fn to_command(kind: DocumentKind, payload: CreateDocumentPayload) -> CreateDocumentCommand {
    CreateDocumentCommand {
        kind,
        partner_id: payload.partner_id,
        customer_name: payload.customer_name,
        payment_method: payload.payment_method,
        origin_document_id: payload.origin_document_id,
        notes: payload.notes,
        created_by: payload.created_by,
        lines: payload
            .lines
            .into_iter()
            .map(|l| LineCommand {
                medicine_id: l.medicine_id,
                batch_id: l.batch_id,
                quantity: l.quantity,
                unit_price: l.unit_price,
                unit_cost: l.unit_cost,
                expiry_date: l.expiry_date,
                barcode: l.barcode,
                origin_line_id: l.origin_line_id,
            })
            .collect(),
    }
}

// ---
// Criação por tipo
// ---

pub async fn create_sale_invoice(
    State(app_state): State<AppState>,
    Json(payload): Json<CreateDocumentPayload>,
) -> Result<impl IntoResponse, AppError> {
    let document = app_state
        .document_service
        .create_document(
            &app_state.db_pool,
            to_command(DocumentKind::SaleInvoice, payload),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn create_purchase_invoice(
    State(app_state): State<AppState>,
    Json(payload): Json<CreateDocumentPayload>,
) -> Result<impl IntoResponse, AppError> {
    let document = app_state
        .document_service
        .create_document(
            &app_state.db_pool,
            to_command(DocumentKind::PurchaseInvoice, payload),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn create_sales_return(
    State(app_state): State<AppState>,
    Json(payload): Json<CreateDocumentPayload>,
) -> Result<impl IntoResponse, AppError> {
    let document = app_state
        .document_service
        .create_document(
            &app_state.db_pool,
            to_command(DocumentKind::SalesReturn, payload),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn create_purchase_return(
    State(app_state): State<AppState>,
    Json(payload): Json<CreateDocumentPayload>,
) -> Result<impl IntoResponse, AppError> {
    let document = app_state
        .document_service
        .create_document(
            &app_state.db_pool,
            to_command(DocumentKind::PurchaseReturn, payload),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

// ---
// Consulta / edição de rascunho
// ---

pub async fn get_document(
    State(app_state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let document = app_state
        .document_service
        .get_document_with_lines(&app_state.db_pool, document_id)
        .await?;
    Ok((StatusCode::OK, Json(document)))
}

pub async fn update_draft_document(
    State(app_state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Json(payload): Json<CreateDocumentPayload>,
) -> Result<impl IntoResponse, AppError> {
    // O tipo não muda na edição: vem do próprio documento.
    let current = app_state
        .document_service
        .get_document_with_lines(&app_state.db_pool, document_id)
        .await?;

    let document = app_state
        .document_service
        .update_draft_document(
            &app_state.db_pool,
            document_id,
            to_command(current.header.kind, payload),
        )
        .await?;
    Ok((StatusCode::OK, Json(document)))
}

pub async fn delete_draft_document(
    State(app_state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    app_state
        .document_service
        .delete_draft_document(&app_state.db_pool, document_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---
// Transições de status
// ---

pub async fn approve_document(
    State(app_state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Json(payload): Json<TransitionPayload>,
) -> Result<impl IntoResponse, AppError> {
    let document = app_state
        .document_service
        .approve_document(&app_state.db_pool, document_id, &payload.user)
        .await?;
    Ok((StatusCode::OK, Json(document)))
}

pub async fn cancel_document(
    State(app_state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Json(payload): Json<TransitionPayload>,
) -> Result<impl IntoResponse, AppError> {
    let document = app_state
        .document_service
        .cancel_document(&app_state.db_pool, document_id, &payload.user)
        .await?;
    Ok((StatusCode::OK, Json(document)))
}

pub async fn unapprove_sale_invoice(
    State(app_state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Json(payload): Json<TransitionPayload>,
) -> Result<impl IntoResponse, AppError> {
    let document = app_state
        .document_service
        .unapprove_sale_invoice(&app_state.db_pool, document_id, &payload.user)
        .await?;
    Ok((StatusCode::OK, Json(document)))
}
