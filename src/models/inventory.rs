// src/models/inventory.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// Lote a menos de 3 dias da validade não pode mais ser vendido,
// mesmo que ainda esteja 'ACTIVE'.
pub const MIN_SALE_SHELF_DAYS: i64 = 3;

// --- Status do Lote ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "batch_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Active,
    Expired,
    Damaged,
    Quarantined,
    Scrapped,
    Empty,
}

// --- Lote ---
// Visão desnormalizada e mutável do estoque físico. O razão (stock_movements)
// guarda o histórico; o lote guarda o saldo consultado pela alocação.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: Uuid,
    pub medicine_id: Uuid,
    // Quantidade recebida na compra. Nunca muda depois de criada.
    pub quantity: i32,
    pub remaining_quantity: i32,
    pub sold_quantity: i32,
    pub unit_purchase_price: Decimal,
    pub expiry_date: NaiveDate,
    pub status: BatchStatus,
    pub barcode: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    pub fn days_until_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiry_date - today).num_days()
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date < today
    }

    // Elegibilidade de venda: saldo positivo, status ativo e
    // validade a pelo menos MIN_SALE_SHELF_DAYS dias.
    pub fn is_sellable(&self, today: NaiveDate) -> bool {
        self.remaining_quantity > 0
            && self.status == BatchStatus::Active
            && self.days_until_expiry(today) >= MIN_SALE_SHELF_DAYS
    }

    // Status derivado: saldo zerado ou validade vencida forçam
    // um status não-ativo. Usado como autocorreção após cada mutação.
    pub fn derived_status(&self, today: NaiveDate) -> BatchStatus {
        match self.status {
            BatchStatus::Active => {
                if self.is_expired(today) {
                    BatchStatus::Expired
                } else if self.remaining_quantity == 0 {
                    BatchStatus::Empty
                } else {
                    BatchStatus::Active
                }
            }
            // Um lote já marcado (danificado, sucateado...) não volta sozinho.
            other => other,
        }
    }

    // Valor residual de prateleira: o que ainda custaria repor o saldo.
    pub fn residual_value(&self) -> Decimal {
        Decimal::from(self.remaining_quantity) * self.unit_purchase_price
    }
}

// --- Tipo de Movimentação ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "movement_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Purchase,
    Sale,
    PurchaseReturn,
    SalesReturn,
    Damage,
    Adjustment,
    Expiry,
}

// --- Tipo do documento de origem de uma movimentação ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reference_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceType {
    SaleInvoice,
    PurchaseInvoice,
    SalesReturn,
    PurchaseReturn,
    BatchScrap,
    ExpirySweep,
}

// --- Movimentação de Estoque (linha do razão) ---
// Imutável depois de gravada. Cancelamento nunca edita nem apaga:
// acrescenta uma movimentação espelhada apontando para a original
// via `reversal_of`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: Uuid,
    pub medicine_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub movement_type: MovementType,
    pub reference_type: ReferenceType,
    pub reference_id: Uuid,
    // Positivo = entrada de estoque, negativo = saída.
    pub quantity: i32,
    pub reversal_of: Option<Uuid>,
    pub created_by: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn batch(remaining: i32, status: BatchStatus, expiry: NaiveDate) -> Batch {
        Batch {
            id: Uuid::new_v4(),
            medicine_id: Uuid::new_v4(),
            quantity: 100,
            remaining_quantity: remaining,
            sold_quantity: 100 - remaining,
            unit_purchase_price: Decimal::new(250, 2),
            expiry_date: expiry,
            status,
            barcode: None,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn dia(ano: i32, mes: u32, dia: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(ano, mes, dia).unwrap()
    }

    #[rstest]
    // validade exatamente no corte de 3 dias ainda vende
    #[case(10, BatchStatus::Active, 3, true)]
    #[case(10, BatchStatus::Active, 2, false)]
    #[case(10, BatchStatus::Active, 0, false)]
    #[case(10, BatchStatus::Active, 40, true)]
    #[case(0, BatchStatus::Active, 40, false)]
    #[case(10, BatchStatus::Quarantined, 40, false)]
    #[case(10, BatchStatus::Damaged, 40, false)]
    fn elegibilidade_de_venda(
        #[case] remaining: i32,
        #[case] status: BatchStatus,
        #[case] dias_para_vencer: i64,
        #[case] esperado: bool,
    ) {
        let hoje = dia(2026, 8, 1);
        let b = batch(remaining, status, hoje + chrono::Duration::days(dias_para_vencer));
        assert_eq!(b.is_sellable(hoje), esperado);
    }

    #[test]
    fn status_derivado_forca_vencido_e_vazio() {
        let hoje = dia(2026, 8, 1);

        let vencido = batch(10, BatchStatus::Active, dia(2026, 7, 31));
        assert_eq!(vencido.derived_status(hoje), BatchStatus::Expired);

        let zerado = batch(0, BatchStatus::Active, dia(2026, 12, 1));
        assert_eq!(zerado.derived_status(hoje), BatchStatus::Empty);

        let normal = batch(5, BatchStatus::Active, dia(2026, 12, 1));
        assert_eq!(normal.derived_status(hoje), BatchStatus::Active);

        // status manual não é sobrescrito pela derivação
        let sucateado = batch(0, BatchStatus::Scrapped, dia(2026, 7, 1));
        assert_eq!(sucateado.derived_status(hoje), BatchStatus::Scrapped);
    }

    #[test]
    fn valor_residual_usa_o_custo_do_lote() {
        let b = batch(8, BatchStatus::Active, dia(2026, 12, 1));
        assert_eq!(b.residual_value(), Decimal::new(2000, 2)); // 8 * 2.50
    }
}
