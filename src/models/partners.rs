// src/models/partners.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// --- Tipo do Parceiro ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "partner_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartnerKind {
    Customer,
    Supplier,
}

// --- Parceiro (cliente ou fornecedor) ---
// `balance` é a dívida corrente: quanto o cliente nos deve, ou quanto
// devemos ao fornecedor. Mutada diretamente pelos fluxos a prazo,
// fora do razão do cofre.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Partner {
    pub id: Uuid,
    pub kind: PartnerKind,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub balance: Decimal,
    // 0 = sem limite. Só é avaliado para clientes em venda a prazo.
    pub credit_limit: Decimal,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Partner {
    // Retorna o excedente caso `addition` estoure o limite de crédito.
    // Limite zero significa ilimitado.
    pub fn credit_excess(&self, addition: Decimal) -> Option<Decimal> {
        if self.credit_limit.is_zero() {
            return None;
        }
        let projected = self.balance + addition;
        if projected > self.credit_limit {
            Some(projected - self.credit_limit)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cliente(balance: Decimal, limit: Decimal) -> Partner {
        Partner {
            id: Uuid::new_v4(),
            kind: PartnerKind::Customer,
            name: "Cliente Teste".into(),
            phone: None,
            address: None,
            balance,
            credit_limit: limit,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn limite_de_credito_carrega_o_excedente() {
        // saldo 480, limite 500: venda de 30 estoura em 10
        let c = cliente(Decimal::new(480, 0), Decimal::new(500, 0));
        assert_eq!(c.credit_excess(Decimal::new(30, 0)), Some(Decimal::new(10, 0)));

        // 480 + 20 = 500 cabe exatamente
        assert_eq!(c.credit_excess(Decimal::new(20, 0)), None);
    }

    #[test]
    fn limite_zero_significa_ilimitado() {
        let c = cliente(Decimal::new(1_000_000, 0), Decimal::ZERO);
        assert_eq!(c.credit_excess(Decimal::new(999_999, 0)), None);
    }
}
