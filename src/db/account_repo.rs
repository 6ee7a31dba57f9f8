// src/db/account_repo.rs

use rust_decimal::Decimal;
use sqlx::{Executor, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::finance::{Account, AccountTransaction, TransactionKind},
    models::inventory::ReferenceType,
};

const ACCOUNT_COLUMNS: &str = "id, code, name, balance, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = r#"
    id, account_id, kind, amount, reference_type, reference_id,
    description, created_at
"#;

// Código da conta única de caixa, semeada na migração inicial.
const VAULT_CODE: &str = "VAULT";

#[derive(Clone)]
pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_vault<'e, E>(&self, executor: E) -> Result<Account, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE code = $1"
        ))
        .bind(VAULT_CODE)
        .fetch_optional(executor)
        .await?;

        account.ok_or_else(|| AppError::NotFound("Cofre".into()))
    }

    // O cofre é recurso quente sob aprovações concorrentes: a linha é
    // travada antes de qualquer aritmética de saldo. Nada de caminho
    // lock-free aqui.
    pub async fn get_vault_for_update(
        &self,
        conn: &mut PgConnection,
    ) -> Result<Account, AppError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE code = $1 FOR UPDATE"
        ))
        .bind(VAULT_CODE)
        .fetch_optional(&mut *conn)
        .await?;

        account.ok_or_else(|| AppError::NotFound("Cofre".into()))
    }

    // Muta o saldo e grava a transação no mesmo passo lógico.
    // A idempotência por (reference_type, reference_id) é responsabilidade
    // do chamador: o fluxo de documentos garante um único post por evento,
    // com estorno explícito quando preciso.
    pub async fn post_transaction(
        &self,
        conn: &mut PgConnection,
        account_id: Uuid,
        kind: TransactionKind,
        amount: Decimal,
        reference_type: ReferenceType,
        reference_id: Uuid,
        description: &str,
    ) -> Result<AccountTransaction, AppError> {
        sqlx::query(
            r#"
            UPDATE accounts SET balance = balance + $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(account_id)
        .bind(kind.signed(amount))
        .execute(&mut *conn)
        .await?;

        let tx = sqlx::query_as::<_, AccountTransaction>(&format!(
            r#"
            INSERT INTO account_transactions (
                account_id, kind, amount, reference_type, reference_id, description
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(account_id)
        .bind(kind)
        .bind(amount)
        .bind(reference_type)
        .bind(reference_id)
        .bind(description)
        .fetch_one(&mut *conn)
        .await?;

        Ok(tx)
    }
}
