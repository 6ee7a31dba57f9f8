// src/models/finance.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::inventory::ReferenceType;

// --- Tipo da Transação ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    // Delta aplicado ao saldo do cofre: entrada soma, saída subtrai.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            TransactionKind::Income => amount,
            TransactionKind::Expense => -amount,
        }
    }

    // O espelho exato, usado pelos estornos.
    pub fn inverse(&self) -> TransactionKind {
        match self {
            TransactionKind::Income => TransactionKind::Expense,
            TransactionKind::Expense => TransactionKind::Income,
        }
    }
}

// --- Conta ---
// Existe uma única conta 'VAULT' (o cofre), criada na migração inicial.
// O saldo só muda através de post_transaction, nunca por escrita direta.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Transação da Conta ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AccountTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: TransactionKind,
    // Sempre positivo; o sentido vem de `kind`.
    pub amount: Decimal,
    pub reference_type: ReferenceType,
    pub reference_id: Uuid,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sinal_e_inverso_das_transacoes() {
        let cem = Decimal::new(10000, 2);
        assert_eq!(TransactionKind::Income.signed(cem), cem);
        assert_eq!(TransactionKind::Expense.signed(cem), -cem);

        assert_eq!(TransactionKind::Income.inverse(), TransactionKind::Expense);
        assert_eq!(TransactionKind::Expense.inverse(), TransactionKind::Income);
    }
}
