// src/db/partner_repo.rs

use rust_decimal::Decimal;
use sqlx::{Executor, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::partners::{Partner, PartnerKind},
};

const PARTNER_COLUMNS: &str = r#"
    id, kind, name, phone, address, balance, credit_limit, is_deleted,
    created_at, updated_at
"#;

#[derive(Clone)]
pub struct PartnerRepository {
    pool: PgPool,
}

impl PartnerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_partner<'e, E>(
        &self,
        executor: E,
        partner_id: Uuid,
        kind: PartnerKind,
    ) -> Result<Partner, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let partner = sqlx::query_as::<_, Partner>(&format!(
            r#"
            SELECT {PARTNER_COLUMNS} FROM partners
            WHERE id = $1 AND kind = $2 AND is_deleted = FALSE
            "#
        ))
        .bind(partner_id)
        .bind(kind)
        .fetch_optional(executor)
        .await?;

        partner.ok_or_else(|| AppError::NotFound(format!("Parceiro {partner_id}")))
    }

    // Trava a linha do parceiro antes da checagem de limite + ajuste de
    // dívida, pelo mesmo motivo do cofre: a checagem e o incremento
    // precisam ser atômicos entre aprovações concorrentes.
    pub async fn get_partner_for_update(
        &self,
        conn: &mut PgConnection,
        partner_id: Uuid,
        kind: PartnerKind,
    ) -> Result<Partner, AppError> {
        let partner = sqlx::query_as::<_, Partner>(&format!(
            r#"
            SELECT {PARTNER_COLUMNS} FROM partners
            WHERE id = $1 AND kind = $2 AND is_deleted = FALSE
            FOR UPDATE
            "#
        ))
        .bind(partner_id)
        .bind(kind)
        .fetch_optional(&mut *conn)
        .await?;

        partner.ok_or_else(|| AppError::NotFound(format!("Parceiro {partner_id}")))
    }

    // Delta positivo aumenta a dívida corrente.
    pub async fn adjust_balance<'e, E>(
        &self,
        executor: E,
        partner_id: Uuid,
        delta: Decimal,
    ) -> Result<Partner, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let partner = sqlx::query_as::<_, Partner>(&format!(
            r#"
            UPDATE partners SET balance = balance + $2, updated_at = now()
            WHERE id = $1 AND is_deleted = FALSE
            RETURNING {PARTNER_COLUMNS}
            "#
        ))
        .bind(partner_id)
        .bind(delta)
        .fetch_optional(executor)
        .await?;

        partner.ok_or_else(|| AppError::NotFound(format!("Parceiro {partner_id}")))
    }
}
