// src/models/catalog.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// --- Medicamento (catálogo) ---
// Identidade imutável; a exclusão é sempre lógica (is_deleted),
// porque lotes e movimentações históricas continuam apontando para cá.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    pub id: Uuid,
    pub name: String,
    pub barcode: Option<String>,
    pub default_sale_price: Decimal,
    pub default_purchase_price: Decimal,
    // Abaixo deste total de unidades restantes, dispara alerta de estoque baixo.
    pub min_alert_quantity: i32,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
