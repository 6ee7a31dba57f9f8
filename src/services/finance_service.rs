// src/services/finance_service.rs

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{AccountRepository, PartnerRepository},
    models::finance::{Account, AccountTransaction, TransactionKind},
    models::inventory::ReferenceType,
    models::partners::{Partner, PartnerKind},
};

#[derive(Clone)]
pub struct FinanceService {
    account_repo: AccountRepository,
    partner_repo: PartnerRepository,
}

impl FinanceService {
    pub fn new(account_repo: AccountRepository, partner_repo: PartnerRepository) -> Self {
        Self {
            account_repo,
            partner_repo,
        }
    }

    pub async fn vault(&self, pool: &PgPool) -> Result<Account, AppError> {
        self.account_repo.get_vault(pool).await
    }

    // Aplica um efeito no cofre dentro da transação do chamador.
    // A linha da conta é travada antes de qualquer aritmética; uma saída
    // que o saldo não cobre é rejeitada inteira, nunca aplicada pela metade.
    pub async fn apply_vault_effect(
        &self,
        conn: &mut PgConnection,
        kind: TransactionKind,
        amount: Decimal,
        reference_type: ReferenceType,
        reference_id: Uuid,
        description: &str,
    ) -> Result<AccountTransaction, AppError> {
        let vault = self.account_repo.get_vault_for_update(&mut *conn).await?;

        if kind == TransactionKind::Expense && vault.balance < amount {
            return Err(AppError::InsufficientFunds {
                missing: amount - vault.balance,
            });
        }

        self.account_repo
            .post_transaction(
                &mut *conn,
                vault.id,
                kind,
                amount,
                reference_type,
                reference_id,
                description,
            )
            .await
    }

    // Ajusta a dívida corrente do parceiro. Delta positivo em cliente
    // passa pela checagem de limite de crédito (0 = ilimitado); a
    // checagem e o incremento acontecem sob a mesma trava de linha.
    pub async fn apply_partner_debt(
        &self,
        conn: &mut PgConnection,
        partner_id: Uuid,
        kind: PartnerKind,
        delta: Decimal,
    ) -> Result<Partner, AppError> {
        let partner = self
            .partner_repo
            .get_partner_for_update(&mut *conn, partner_id, kind)
            .await?;

        if kind == PartnerKind::Customer && delta > Decimal::ZERO {
            if let Some(excess) = partner.credit_excess(delta) {
                return Err(AppError::CreditLimitExceeded { excess });
            }
        }

        self.partner_repo
            .adjust_balance(&mut *conn, partner_id, delta)
            .await
    }
}
