// src/handlers/finance.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{common::error::AppError, config::AppState};

pub async fn get_vault(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let vault = app_state
        .finance_service
        .vault(&app_state.db_pool)
        .await?;
    Ok((StatusCode::OK, Json(vault)))
}
