// src/db/sequence_repo.rs

use sqlx::{Executor, PgPool, Postgres};

use crate::common::error::AppError;

#[derive(Clone)]
pub struct SequenceRepository {
    pool: PgPool,
}

impl SequenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Próximo número do documento para (prefixo, ano). O upsert incrementa
    // de forma atômica, a mesma disciplina do saldo do cofre: dois
    // documentos criados ao mesmo tempo nunca recebem o mesmo número.
    pub async fn next_number<'e, E>(
        &self,
        executor: E,
        prefix: &str,
        year: i32,
    ) -> Result<String, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let number: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO document_sequences (prefix, year, last_number)
            VALUES ($1, $2, 1)
            ON CONFLICT (prefix, year)
            DO UPDATE SET last_number = document_sequences.last_number + 1
            RETURNING last_number
            "#,
        )
        .bind(prefix)
        .bind(year)
        .fetch_one(executor)
        .await?;

        Ok(format!("{prefix}-{year}-{number:06}"))
    }
}
