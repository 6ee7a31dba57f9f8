// src/db/medicine_repo.rs

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{common::error::AppError, models::catalog::Medicine};

const MEDICINE_COLUMNS: &str = r#"
    id, name, barcode, default_sale_price, default_purchase_price,
    min_alert_quantity, is_deleted, created_at, updated_at
"#;

#[derive(Clone)]
pub struct MedicineRepository {
    pool: PgPool,
}

impl MedicineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_medicine<'e, E>(
        &self,
        executor: E,
        medicine_id: Uuid,
    ) -> Result<Medicine, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let medicine = sqlx::query_as::<_, Medicine>(&format!(
            "SELECT {MEDICINE_COLUMNS} FROM medicines WHERE id = $1 AND is_deleted = FALSE"
        ))
        .bind(medicine_id)
        .fetch_optional(executor)
        .await?;

        medicine.ok_or_else(|| AppError::NotFound(format!("Medicamento {medicine_id}")))
    }

    // Total de unidades ainda vendáveis somando todos os lotes ativos.
    // Alimenta o alerta de estoque baixo disparado depois de uma venda.
    pub async fn total_remaining<'e, E>(
        &self,
        executor: E,
        medicine_id: Uuid,
    ) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(remaining_quantity)::bigint FROM batches
            WHERE medicine_id = $1
              AND is_deleted = FALSE
              AND status = 'ACTIVE'
            "#,
        )
        .bind(medicine_id)
        .fetch_one(executor)
        .await?;

        Ok(total.unwrap_or(0))
    }
}
