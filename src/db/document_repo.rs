// src/db/document_repo.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{Executor, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::documents::{Document, DocumentKind, DocumentLine, DocumentStatus, PaymentMethod},
};

const DOCUMENT_COLUMNS: &str = r#"
    id, kind, status, number, partner_id, customer_name, payment_method,
    amount, cost, profit, origin_document_id, notes, created_by,
    approved_at, created_at, updated_at
"#;

const LINE_COLUMNS: &str = r#"
    id, document_id, medicine_id, batch_id, quantity, unit_price, unit_cost,
    remaining_qty_to_return, origin_line_id, incoming_expiry_date,
    incoming_barcode, created_at
"#;

// Parâmetros de inserção de uma linha.
pub struct NewLine<'a> {
    pub medicine_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub unit_cost: Decimal,
    pub origin_line_id: Option<Uuid>,
    pub incoming_expiry_date: Option<NaiveDate>,
    pub incoming_barcode: Option<&'a str>,
}

#[derive(Clone)]
pub struct DocumentRepository {
    pool: PgPool,
}

impl DocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // --- CABEÇALHO ---

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_document<'e, E>(
        &self,
        executor: E,
        kind: DocumentKind,
        number: &str,
        partner_id: Option<Uuid>,
        customer_name: Option<&str>,
        payment_method: PaymentMethod,
        origin_document_id: Option<Uuid>,
        notes: Option<&str>,
        created_by: &str,
    ) -> Result<Document, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let document = sqlx::query_as::<_, Document>(&format!(
            r#"
            INSERT INTO documents (
                kind, status, number, partner_id, customer_name,
                payment_method, origin_document_id, notes, created_by
            )
            VALUES ($1, 'DRAFT', $2, $3, $4, $5, $6, $7, $8)
            RETURNING {DOCUMENT_COLUMNS}
            "#
        ))
        .bind(kind)
        .bind(number)
        .bind(partner_id)
        .bind(customer_name)
        .bind(payment_method)
        .bind(origin_document_id)
        .bind(notes)
        .bind(created_by)
        .fetch_one(executor)
        .await?;

        Ok(document)
    }

    pub async fn get_document<'e, E>(
        &self,
        executor: E,
        document_id: Uuid,
    ) -> Result<Document, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let document = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"
        ))
        .bind(document_id)
        .fetch_optional(executor)
        .await?;

        document.ok_or_else(|| AppError::NotFound(format!("Documento {document_id}")))
    }

    // Trava o cabeçalho: duas transições de status disputando o mesmo
    // documento ficam serializadas, e a segunda enxerga o status já mudado.
    pub async fn get_document_for_update(
        &self,
        conn: &mut PgConnection,
        document_id: Uuid,
    ) -> Result<Document, AppError> {
        let document = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1 FOR UPDATE"
        ))
        .bind(document_id)
        .fetch_optional(&mut *conn)
        .await?;

        document.ok_or_else(|| AppError::NotFound(format!("Documento {document_id}")))
    }

    pub async fn set_status<'e, E>(
        &self,
        executor: E,
        document_id: Uuid,
        status: DocumentStatus,
    ) -> Result<Document, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let document = sqlx::query_as::<_, Document>(&format!(
            r#"
            UPDATE documents SET
                status = $2,
                approved_at = CASE WHEN $2 = 'APPROVED'::document_status
                                   THEN now() ELSE approved_at END,
                updated_at = now()
            WHERE id = $1
            RETURNING {DOCUMENT_COLUMNS}
            "#
        ))
        .bind(document_id)
        .bind(status)
        .fetch_one(executor)
        .await?;

        Ok(document)
    }

    pub async fn set_totals<'e, E>(
        &self,
        executor: E,
        document_id: Uuid,
        amount: Decimal,
        cost: Decimal,
        profit: Decimal,
    ) -> Result<Document, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let document = sqlx::query_as::<_, Document>(&format!(
            r#"
            UPDATE documents SET amount = $2, cost = $3, profit = $4, updated_at = now()
            WHERE id = $1
            RETURNING {DOCUMENT_COLUMNS}
            "#
        ))
        .bind(document_id)
        .bind(amount)
        .bind(cost)
        .bind(profit)
        .fetch_one(executor)
        .await?;

        Ok(document)
    }

    // Deltas nos totais do cabeçalho. A aprovação de uma devolução reverte
    // a parcela proporcional na fatura de origem por aqui (e o estorno da
    // devolução aplica o espelho).
    pub async fn add_totals<'e, E>(
        &self,
        executor: E,
        document_id: Uuid,
        amount_delta: Decimal,
        cost_delta: Decimal,
        profit_delta: Decimal,
    ) -> Result<Document, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let document = sqlx::query_as::<_, Document>(&format!(
            r#"
            UPDATE documents SET
                amount = amount + $2,
                cost = cost + $3,
                profit = profit + $4,
                updated_at = now()
            WHERE id = $1
            RETURNING {DOCUMENT_COLUMNS}
            "#
        ))
        .bind(document_id)
        .bind(amount_delta)
        .bind(cost_delta)
        .bind(profit_delta)
        .fetch_one(executor)
        .await?;

        Ok(document)
    }

    pub async fn update_draft_header<'e, E>(
        &self,
        executor: E,
        document_id: Uuid,
        partner_id: Option<Uuid>,
        customer_name: Option<&str>,
        payment_method: PaymentMethod,
        notes: Option<&str>,
    ) -> Result<Document, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let document = sqlx::query_as::<_, Document>(&format!(
            r#"
            UPDATE documents SET
                partner_id = $2,
                customer_name = $3,
                payment_method = $4,
                notes = $5,
                updated_at = now()
            WHERE id = $1
            RETURNING {DOCUMENT_COLUMNS}
            "#
        ))
        .bind(document_id)
        .bind(partner_id)
        .bind(customer_name)
        .bind(payment_method)
        .bind(notes)
        .fetch_one(executor)
        .await?;

        Ok(document)
    }

    // Exclusão física: permitida somente para rascunho, e as linhas
    // caem junto pelo ON DELETE CASCADE.
    pub async fn delete_document<'e, E>(
        &self,
        executor: E,
        document_id: Uuid,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(document_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    // Existe devolução não cancelada apontando para este documento?
    // Guarda do cancelamento e da desaprovação.
    pub async fn has_noncancelled_returns<'e, E>(
        &self,
        executor: E,
        document_id: Uuid,
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM documents
                WHERE origin_document_id = $1 AND status <> 'CANCELLED'
            )
            "#,
        )
        .bind(document_id)
        .fetch_one(executor)
        .await?;

        Ok(exists)
    }

    // --- LINHAS ---

    pub async fn insert_line<'e, E>(
        &self,
        executor: E,
        document_id: Uuid,
        line: NewLine<'_>,
    ) -> Result<DocumentLine, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let created = sqlx::query_as::<_, DocumentLine>(&format!(
            r#"
            INSERT INTO document_lines (
                document_id, medicine_id, batch_id, quantity, unit_price,
                unit_cost, origin_line_id, incoming_expiry_date, incoming_barcode
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {LINE_COLUMNS}
            "#
        ))
        .bind(document_id)
        .bind(line.medicine_id)
        .bind(line.batch_id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.unit_cost)
        .bind(line.origin_line_id)
        .bind(line.incoming_expiry_date)
        .bind(line.incoming_barcode)
        .fetch_one(executor)
        .await?;

        Ok(created)
    }

    pub async fn get_lines<'e, E>(
        &self,
        executor: E,
        document_id: Uuid,
    ) -> Result<Vec<DocumentLine>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let lines = sqlx::query_as::<_, DocumentLine>(&format!(
            r#"
            SELECT {LINE_COLUMNS} FROM document_lines
            WHERE document_id = $1
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(document_id)
        .fetch_all(executor)
        .await?;

        Ok(lines)
    }

    pub async fn get_line<'e, E>(
        &self,
        executor: E,
        line_id: Uuid,
    ) -> Result<DocumentLine, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let line = sqlx::query_as::<_, DocumentLine>(&format!(
            "SELECT {LINE_COLUMNS} FROM document_lines WHERE id = $1"
        ))
        .bind(line_id)
        .fetch_optional(executor)
        .await?;

        line.ok_or_else(|| AppError::NotFound(format!("Linha {line_id}")))
    }

    // A linha de origem é travada antes de validar/decrementar o saldo
    // devolvível: duas devoluções parciais concorrentes não podem ambas
    // passar na mesma folga.
    pub async fn get_line_for_update(
        &self,
        conn: &mut PgConnection,
        line_id: Uuid,
    ) -> Result<DocumentLine, AppError> {
        let line = sqlx::query_as::<_, DocumentLine>(&format!(
            "SELECT {LINE_COLUMNS} FROM document_lines WHERE id = $1 FOR UPDATE"
        ))
        .bind(line_id)
        .fetch_optional(&mut *conn)
        .await?;

        line.ok_or_else(|| AppError::NotFound(format!("Linha {line_id}")))
    }

    pub async fn delete_lines<'e, E>(
        &self,
        executor: E,
        document_id: Uuid,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("DELETE FROM document_lines WHERE document_id = $1")
            .bind(document_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    // A aprovação da compra cria o lote físico e o amarra de volta à linha.
    pub async fn set_line_batch<'e, E>(
        &self,
        executor: E,
        line_id: Uuid,
        batch_id: Uuid,
    ) -> Result<DocumentLine, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let line = sqlx::query_as::<_, DocumentLine>(&format!(
            r#"
            UPDATE document_lines SET batch_id = $2
            WHERE id = $1
            RETURNING {LINE_COLUMNS}
            "#
        ))
        .bind(line_id)
        .bind(batch_id)
        .fetch_optional(executor)
        .await?;

        line.ok_or_else(|| AppError::NotFound(format!("Linha {line_id}")))
    }

    // Na aprovação da venda, cada linha passa a aceitar devolução
    // do total vendido; a desaprovação zera de volta.
    pub async fn set_lines_returnable<'e, E>(
        &self,
        executor: E,
        document_id: Uuid,
        full: bool,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE document_lines
            SET remaining_qty_to_return = CASE WHEN $2 THEN quantity ELSE 0 END
            WHERE document_id = $1
            "#,
        )
        .bind(document_id)
        .bind(full)
        .execute(executor)
        .await?;
        Ok(())
    }

    // Delta no saldo devolvível da linha de origem, com a guarda na query:
    // nunca abaixo de zero, nunca acima da quantidade vendida.
    pub async fn adjust_line_remaining_return<'e, E>(
        &self,
        executor: E,
        line_id: Uuid,
        delta: i32,
    ) -> Result<DocumentLine, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let line = sqlx::query_as::<_, DocumentLine>(&format!(
            r#"
            UPDATE document_lines
            SET remaining_qty_to_return = remaining_qty_to_return + $2
            WHERE id = $1
              AND remaining_qty_to_return + $2 >= 0
              AND remaining_qty_to_return + $2 <= quantity
            RETURNING {LINE_COLUMNS}
            "#
        ))
        .bind(line_id)
        .bind(delta)
        .fetch_optional(executor)
        .await?;

        line.ok_or(AppError::OverReturn)
    }
}
