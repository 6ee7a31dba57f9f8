// src/db/movement_repo.rs

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::inventory::{MovementType, ReferenceType, StockMovement},
};

const MOVEMENT_COLUMNS: &str = r#"
    id, medicine_id, batch_id, movement_type, reference_type, reference_id,
    quantity, reversal_of, created_by, notes, created_at
"#;

// Parâmetros de um lançamento. O razão é append-only: não existe
// update nem delete neste repositório, de propósito.
pub struct NewMovement<'a> {
    pub medicine_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub movement_type: MovementType,
    pub reference_type: ReferenceType,
    pub reference_id: Uuid,
    pub quantity: i32,
    pub reversal_of: Option<Uuid>,
    pub created_by: &'a str,
    pub notes: Option<&'a str>,
}

#[derive(Clone)]
pub struct MovementRepository {
    pool: PgPool,
}

impl MovementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn append<'e, E>(
        &self,
        executor: E,
        movement: NewMovement<'_>,
    ) -> Result<StockMovement, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let created = sqlx::query_as::<_, StockMovement>(&format!(
            r#"
            INSERT INTO stock_movements (
                medicine_id, batch_id, movement_type, reference_type,
                reference_id, quantity, reversal_of, created_by, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {MOVEMENT_COLUMNS}
            "#
        ))
        .bind(movement.medicine_id)
        .bind(movement.batch_id)
        .bind(movement.movement_type)
        .bind(movement.reference_type)
        .bind(movement.reference_id)
        .bind(movement.quantity)
        .bind(movement.reversal_of)
        .bind(movement.created_by)
        .bind(movement.notes)
        .fetch_one(executor)
        .await?;

        Ok(created)
    }

    // Movimentações que um documento produziu, na ordem em que foram
    // gravadas. É daqui que o estorno gera o conjunto espelhado.
    pub async fn movements_for<'e, E>(
        &self,
        executor: E,
        reference_type: ReferenceType,
        reference_id: Uuid,
    ) -> Result<Vec<StockMovement>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let movements = sqlx::query_as::<_, StockMovement>(&format!(
            r#"
            SELECT {MOVEMENT_COLUMNS} FROM stock_movements
            WHERE reference_type = $1 AND reference_id = $2
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(reference_type)
        .bind(reference_id)
        .fetch_all(executor)
        .await?;

        Ok(movements)
    }

    // Saldo recomputado a partir do razão. Visão de auditoria: a alocação
    // consulta o saldo desnormalizado do lote, não este número.
    pub async fn current_balance<'e, E>(
        &self,
        executor: E,
        medicine_id: Uuid,
        batch_id: Option<Uuid>,
    ) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sum: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(quantity)::bigint FROM stock_movements
            WHERE medicine_id = $1
              AND ($2::uuid IS NULL OR batch_id = $2)
            "#,
        )
        .bind(medicine_id)
        .bind(batch_id)
        .fetch_one(executor)
        .await?;

        Ok(sum.unwrap_or(0))
    }
}
