// src/handlers/inventory.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{common::error::AppError, config::AppState};

// ---
// Payload: sucateamento / avaria de lote
// ---
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapBatchPayload {
    // true = avaria (DAMAGED); false = sucateamento (SCRAPPED)
    #[serde(default)]
    pub damaged: bool,
    pub reason: Option<String>,
    pub user: String,
}

pub async fn scrap_batch(
    State(app_state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Json(payload): Json<ScrapBatchPayload>,
) -> Result<impl IntoResponse, AppError> {
    let batch = app_state
        .inventory_service
        .scrap_batch(
            &app_state.db_pool,
            batch_id,
            payload.damaged,
            payload.reason.as_deref(),
            &payload.user,
        )
        .await?;
    Ok((StatusCode::OK, Json(batch)))
}

// Disparo manual da varredura; a mesma rotina roda periodicamente
// em segundo plano.
pub async fn run_expiry_sweep(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let report = app_state
        .inventory_service
        .run_expiry_sweep(&app_state.db_pool)
        .await?;
    Ok((StatusCode::OK, Json(report)))
}

// Prévia FEFO: os lotes vendáveis na ordem em que a alocação os consumiria.
pub async fn list_sellable_batches(
    State(app_state): State<AppState>,
    Path(medicine_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let batches = app_state
        .inventory_service
        .list_sellable(&app_state.db_pool, medicine_id)
        .await?;
    Ok((StatusCode::OK, Json(batches)))
}

// Auditoria: saldo do lote contra a soma do razão.
pub async fn reconcile_batch(
    State(app_state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let report = app_state
        .inventory_service
        .reconcile_batch(&app_state.db_pool, batch_id)
        .await?;
    Ok((StatusCode::OK, Json(report)))
}

pub async fn medicine_ledger_balance(
    State(app_state): State<AppState>,
    Path(medicine_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let balance = app_state
        .inventory_service
        .ledger_balance(&app_state.db_pool, medicine_id, None)
        .await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "balance": balance }))))
}
