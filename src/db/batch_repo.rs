// src/db/batch_repo.rs

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::inventory::{Batch, BatchStatus, MIN_SALE_SHELF_DAYS},
};

const BATCH_COLUMNS: &str = r#"
    id, medicine_id, quantity, remaining_quantity, sold_quantity,
    unit_purchase_price, expiry_date, status, barcode, is_deleted,
    created_at, updated_at
"#;

#[derive(Clone)]
pub struct BatchRepository {
    pool: PgPool,
}

impl BatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_batch<'e, E>(&self, executor: E, batch_id: Uuid) -> Result<Batch, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let batch = sqlx::query_as::<_, Batch>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE id = $1 AND is_deleted = FALSE"
        ))
        .bind(batch_id)
        .fetch_optional(executor)
        .await?;

        batch.ok_or_else(|| AppError::NotFound(format!("Lote {batch_id}")))
    }

    // Leitura com trava de linha. Toda mutação de lote dentro de uma
    // aprovação passa por aqui primeiro: duas aprovações disputando o
    // mesmo lote ficam serializadas no banco.
    pub async fn get_batch_for_update(
        &self,
        conn: &mut PgConnection,
        batch_id: Uuid,
    ) -> Result<Batch, AppError> {
        let batch = sqlx::query_as::<_, Batch>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE id = $1 AND is_deleted = FALSE FOR UPDATE"
        ))
        .bind(batch_id)
        .fetch_optional(&mut *conn)
        .await?;

        batch.ok_or_else(|| AppError::NotFound(format!("Lote {batch_id}")))
    }

    // Lotes vendáveis de um medicamento, já na ordem FEFO:
    // validade mais próxima primeiro, empate desfeito pelo id.
    // Travados porque o chamador vai consumi-los em seguida.
    pub async fn find_sellable_fefo(
        &self,
        conn: &mut PgConnection,
        medicine_id: Uuid,
        today: NaiveDate,
    ) -> Result<Vec<Batch>, AppError> {
        let min_expiry = today + chrono::Duration::days(MIN_SALE_SHELF_DAYS);

        let batches = sqlx::query_as::<_, Batch>(&format!(
            r#"
            SELECT {BATCH_COLUMNS} FROM batches
            WHERE medicine_id = $1
              AND is_deleted = FALSE
              AND status = 'ACTIVE'
              AND remaining_quantity > 0
              AND expiry_date >= $2
            ORDER BY expiry_date ASC, id ASC
            FOR UPDATE
            "#
        ))
        .bind(medicine_id)
        .bind(min_expiry)
        .fetch_all(&mut *conn)
        .await?;

        Ok(batches)
    }

    // Visão sem trava, para consulta de disponibilidade.
    pub async fn list_sellable<'e, E>(
        &self,
        executor: E,
        medicine_id: Uuid,
        today: NaiveDate,
    ) -> Result<Vec<Batch>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let min_expiry = today + chrono::Duration::days(MIN_SALE_SHELF_DAYS);

        let batches = sqlx::query_as::<_, Batch>(&format!(
            r#"
            SELECT {BATCH_COLUMNS} FROM batches
            WHERE medicine_id = $1
              AND is_deleted = FALSE
              AND status = 'ACTIVE'
              AND remaining_quantity > 0
              AND expiry_date >= $2
            ORDER BY expiry_date ASC, id ASC
            "#
        ))
        .bind(medicine_id)
        .bind(min_expiry)
        .fetch_all(executor)
        .await?;

        Ok(batches)
    }

    pub async fn create_batch<'e, E>(
        &self,
        executor: E,
        medicine_id: Uuid,
        quantity: i32,
        unit_purchase_price: Decimal,
        expiry_date: NaiveDate,
        barcode: Option<&str>,
    ) -> Result<Batch, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        // Lote nasce cheio: recebido = restante, nada vendido.
        let batch = sqlx::query_as::<_, Batch>(&format!(
            r#"
            INSERT INTO batches (
                medicine_id, quantity, remaining_quantity, sold_quantity,
                unit_purchase_price, expiry_date, status, barcode
            )
            VALUES ($1, $2, $2, 0, $3, $4, 'ACTIVE', $5)
            RETURNING {BATCH_COLUMNS}
            "#
        ))
        .bind(medicine_id)
        .bind(quantity)
        .bind(unit_purchase_price)
        .bind(expiry_date)
        .bind(barcode)
        .fetch_one(executor)
        .await?;

        Ok(batch)
    }

    // Núcleo de toda mutação de saldo: aplica os deltas com as guardas
    // de invariante na própria query (check-then-update atômico) e já
    // recalcula o status derivado. Nenhuma linha afetada = invariante
    // seria violada; o chamador classifica o erro.
    async fn apply_deltas(
        &self,
        conn: &mut PgConnection,
        batch_id: Uuid,
        remaining_delta: i32,
        sold_delta: i32,
    ) -> Result<Option<Batch>, AppError> {
        let today = Utc::now().date_naive();

        let batch = sqlx::query_as::<_, Batch>(&format!(
            r#"
            UPDATE batches SET
                remaining_quantity = remaining_quantity + $2,
                sold_quantity      = sold_quantity + $3,
                status = CASE
                    WHEN status NOT IN ('ACTIVE', 'EMPTY') THEN status
                    WHEN expiry_date < $4 THEN 'EXPIRED'::batch_status
                    WHEN remaining_quantity + $2 = 0 THEN 'EMPTY'::batch_status
                    ELSE 'ACTIVE'::batch_status
                END,
                updated_at = now()
            WHERE id = $1
              AND is_deleted = FALSE
              AND remaining_quantity + $2 >= 0
              AND remaining_quantity + $2 <= quantity
              AND sold_quantity + $3 >= 0
            RETURNING {BATCH_COLUMNS}
            "#
        ))
        .bind(batch_id)
        .bind(remaining_delta)
        .bind(sold_delta)
        .bind(today)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(batch)
    }

    // Consome unidades para uma venda: restante desce, vendido sobe.
    pub async fn reserve(
        &self,
        conn: &mut PgConnection,
        batch_id: Uuid,
        qty: i32,
    ) -> Result<Batch, AppError> {
        match self.apply_deltas(&mut *conn, batch_id, -qty, qty).await? {
            Some(batch) => Ok(batch),
            None => Err(self.stock_deficit(&mut *conn, batch_id, qty).await?),
        }
    }

    // Inverso exato de `reserve`: devolução/estorno de venda.
    pub async fn release(
        &self,
        conn: &mut PgConnection,
        batch_id: Uuid,
        qty: i32,
    ) -> Result<Batch, AppError> {
        match self.apply_deltas(&mut *conn, batch_id, qty, -qty).await? {
            Some(batch) => Ok(batch),
            None => Err(AppError::OverReturn),
        }
    }

    // Saída que não é venda: devolução ao fornecedor ou estorno de compra.
    // Só mexe no restante; o vendido não entra na conta.
    pub async fn withdraw(
        &self,
        conn: &mut PgConnection,
        batch_id: Uuid,
        qty: i32,
    ) -> Result<Batch, AppError> {
        match self.apply_deltas(&mut *conn, batch_id, -qty, 0).await? {
            Some(batch) => Ok(batch),
            None => Err(self.stock_deficit(&mut *conn, batch_id, qty).await?),
        }
    }

    // Inverso de `withdraw`: estorno de devolução ao fornecedor.
    pub async fn restock(
        &self,
        conn: &mut PgConnection,
        batch_id: Uuid,
        qty: i32,
    ) -> Result<Batch, AppError> {
        match self.apply_deltas(&mut *conn, batch_id, qty, 0).await? {
            Some(batch) => Ok(batch),
            None => Err(AppError::OverReturn),
        }
    }

    async fn stock_deficit(
        &self,
        conn: &mut PgConnection,
        batch_id: Uuid,
        qty: i32,
    ) -> Result<AppError, AppError> {
        let batch = self.get_batch(&mut *conn, batch_id).await?;
        Ok(AppError::InsufficientStock {
            deficit: qty - batch.remaining_quantity,
        })
    }

    // Usado pelos fluxos de sucateamento/avaria e pela varredura de validade.
    pub async fn mark_status<'e, E>(
        &self,
        executor: E,
        batch_id: Uuid,
        status: BatchStatus,
    ) -> Result<Batch, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let batch = sqlx::query_as::<_, Batch>(&format!(
            r#"
            UPDATE batches SET status = $2, updated_at = now()
            WHERE id = $1 AND is_deleted = FALSE
            RETURNING {BATCH_COLUMNS}
            "#
        ))
        .bind(batch_id)
        .bind(status)
        .fetch_optional(executor)
        .await?;

        batch.ok_or_else(|| AppError::NotFound(format!("Lote {batch_id}")))
    }

    // Lotes ativos com validade vencida, travados para a varredura marcar.
    pub async fn list_expired_active(
        &self,
        conn: &mut PgConnection,
        today: NaiveDate,
    ) -> Result<Vec<Batch>, AppError> {
        let batches = sqlx::query_as::<_, Batch>(&format!(
            r#"
            SELECT {BATCH_COLUMNS} FROM batches
            WHERE is_deleted = FALSE
              AND status = 'ACTIVE'
              AND expiry_date < $1
            ORDER BY id ASC
            FOR UPDATE
            "#
        ))
        .bind(today)
        .fetch_all(&mut *conn)
        .await?;

        Ok(batches)
    }
}
