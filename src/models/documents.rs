// src/models/documents.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::finance::TransactionKind;
use crate::models::inventory::{MovementType, ReferenceType};
use crate::models::partners::PartnerKind;

// Carve-out da venda abaixo do custo: liberada apenas para lote
// com validade a no máximo 21 dias (melhor vender barato do que perder tudo).
pub const BELOW_COST_SHELF_DAYS: i64 = 21;

// --- Tipo do Documento ---
// Os quatro documentos compartilham a mesma máquina de estados; o que muda
// (sentido do estoque, sentido da dívida, tipo de movimentação) fica
// concentrado nos métodos deste enum, em vez de quatro serviços quase iguais.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "document_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentKind {
    SaleInvoice,
    PurchaseInvoice,
    SalesReturn,
    PurchaseReturn,
}

impl DocumentKind {
    // Prefixo da numeração sequencial (por prefixo + ano).
    pub fn number_prefix(&self) -> &'static str {
        match self {
            DocumentKind::SaleInvoice => "FV",
            DocumentKind::PurchaseInvoice => "FC",
            DocumentKind::SalesReturn => "DV",
            DocumentKind::PurchaseReturn => "DC",
        }
    }

    pub fn movement_type(&self) -> MovementType {
        match self {
            DocumentKind::SaleInvoice => MovementType::Sale,
            DocumentKind::PurchaseInvoice => MovementType::Purchase,
            DocumentKind::SalesReturn => MovementType::SalesReturn,
            DocumentKind::PurchaseReturn => MovementType::PurchaseReturn,
        }
    }

    pub fn reference_type(&self) -> ReferenceType {
        match self {
            DocumentKind::SaleInvoice => ReferenceType::SaleInvoice,
            DocumentKind::PurchaseInvoice => ReferenceType::PurchaseInvoice,
            DocumentKind::SalesReturn => ReferenceType::SalesReturn,
            DocumentKind::PurchaseReturn => ReferenceType::PurchaseReturn,
        }
    }

    // Sinal da movimentação de estoque gravada na aprovação.
    // Venda e devolução de compra tiram unidades; compra e devolução
    // de venda devolvem unidades à prateleira.
    pub fn stock_sign(&self) -> i32 {
        match self {
            DocumentKind::SaleInvoice | DocumentKind::PurchaseReturn => -1,
            DocumentKind::PurchaseInvoice | DocumentKind::SalesReturn => 1,
        }
    }

    // Efeito no cofre quando o documento é à vista.
    pub fn vault_effect(&self) -> TransactionKind {
        match self {
            DocumentKind::SaleInvoice | DocumentKind::PurchaseReturn => TransactionKind::Income,
            DocumentKind::PurchaseInvoice | DocumentKind::SalesReturn => TransactionKind::Expense,
        }
    }

    // Efeito na dívida do parceiro quando o documento é a prazo.
    // Positivo aumenta a dívida corrente (cliente nos devendo,
    // ou nós devendo ao fornecedor).
    pub fn debt_sign(&self) -> i32 {
        match self {
            DocumentKind::SaleInvoice | DocumentKind::PurchaseInvoice => 1,
            DocumentKind::SalesReturn | DocumentKind::PurchaseReturn => -1,
        }
    }

    pub fn partner_kind(&self) -> PartnerKind {
        match self {
            DocumentKind::SaleInvoice | DocumentKind::SalesReturn => PartnerKind::Customer,
            DocumentKind::PurchaseInvoice | DocumentKind::PurchaseReturn => PartnerKind::Supplier,
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, DocumentKind::SalesReturn | DocumentKind::PurchaseReturn)
    }

    // Tipo do documento de origem exigido por uma devolução.
    pub fn origin_kind(&self) -> Option<DocumentKind> {
        match self {
            DocumentKind::SalesReturn => Some(DocumentKind::SaleInvoice),
            DocumentKind::PurchaseReturn => Some(DocumentKind::PurchaseInvoice),
            _ => None,
        }
    }
}

// --- Status do Documento ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "document_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Draft,
    Approved,
    Cancelled,
}

impl DocumentStatus {
    // Rascunho pode ser editado e apagado fisicamente; depois disso,
    // o documento só muda via transições de status.
    pub fn is_editable(&self) -> bool {
        matches!(self, DocumentStatus::Draft)
    }

    pub fn can_approve(&self) -> bool {
        matches!(self, DocumentStatus::Draft)
    }

    // Cancelar e desaprovar só fazem sentido para documento aprovado:
    // o estorno desfaz efeitos que um rascunho ainda não produziu.
    pub fn can_reverse(&self) -> bool {
        matches!(self, DocumentStatus::Approved)
    }
}

// --- Forma de Pagamento ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Credit,
}

// --- Cabeçalho do Documento ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub kind: DocumentKind,
    pub status: DocumentStatus,
    pub number: String,
    pub partner_id: Option<Uuid>,
    // Venda balcão: cliente sem cadastro, mas o nome é obrigatório.
    pub customer_name: Option<String>,
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
    pub cost: Decimal,
    pub profit: Decimal,
    // Devoluções apontam para a fatura de origem.
    pub origin_document_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_by: String,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Linha do Documento ---
// Cada linha amarra exatamente um lote. Uma venda lógica de N unidades
// pode virar várias linhas físicas, uma por lote consumido, cada qual
// com o custo daquele lote.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLine {
    pub id: Uuid,
    pub document_id: Uuid,
    pub medicine_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub unit_cost: Decimal,
    // Saldo devolvível: decresce conforme devoluções parciais são aprovadas.
    pub remaining_qty_to_return: i32,
    // Linha de devolução aponta para a linha de origem que revalida.
    pub origin_line_id: Option<Uuid>,
    // Linha de compra descreve o lote que ainda vai ser criado.
    pub incoming_expiry_date: Option<chrono::NaiveDate>,
    pub incoming_barcode: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DocumentLine {
    pub fn line_amount(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_price
    }

    pub fn line_cost(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_cost
    }
}

// Guarda da venda abaixo do custo: preço menor que o custo do lote
// só passa se a validade estiver dentro do carve-out de 21 dias.
pub fn below_cost_allowed(
    unit_price: Decimal,
    unit_cost: Decimal,
    days_until_expiry: i64,
) -> bool {
    unit_price >= unit_cost || days_until_expiry <= BELOW_COST_SHELF_DAYS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transicoes_legais_da_maquina_de_estados() {
        assert!(DocumentStatus::Draft.can_approve());
        assert!(!DocumentStatus::Approved.can_approve());
        assert!(!DocumentStatus::Cancelled.can_approve());

        assert!(DocumentStatus::Approved.can_reverse());
        // estornar duas vezes: o segundo estorno encontra Cancelled/Draft
        assert!(!DocumentStatus::Cancelled.can_reverse());
        assert!(!DocumentStatus::Draft.can_reverse());

        assert!(DocumentStatus::Draft.is_editable());
        assert!(!DocumentStatus::Approved.is_editable());
    }

    #[test]
    fn capacidades_por_tipo_de_documento() {
        use DocumentKind::*;

        assert_eq!(SaleInvoice.stock_sign(), -1);
        assert_eq!(PurchaseInvoice.stock_sign(), 1);
        assert_eq!(SalesReturn.stock_sign(), 1);
        assert_eq!(PurchaseReturn.stock_sign(), -1);

        assert_eq!(SaleInvoice.vault_effect(), TransactionKind::Income);
        assert_eq!(PurchaseInvoice.vault_effect(), TransactionKind::Expense);
        assert_eq!(SalesReturn.vault_effect(), TransactionKind::Expense);
        assert_eq!(PurchaseReturn.vault_effect(), TransactionKind::Income);

        assert_eq!(SalesReturn.origin_kind(), Some(SaleInvoice));
        assert_eq!(PurchaseReturn.origin_kind(), Some(PurchaseInvoice));
        assert_eq!(SaleInvoice.origin_kind(), None);

        assert_eq!(SaleInvoice.partner_kind(), PartnerKind::Customer);
        assert_eq!(PurchaseReturn.partner_kind(), PartnerKind::Supplier);
    }

    #[test]
    fn venda_abaixo_do_custo_so_com_validade_proxima() {
        let preco = Decimal::new(100, 2); // 1.00
        let custo = Decimal::new(150, 2); // 1.50

        assert!(!below_cost_allowed(preco, custo, 40));
        assert!(below_cost_allowed(preco, custo, 21)); // fronteira inclusa
        assert!(below_cost_allowed(preco, custo, 5));

        // preço digno nunca é bloqueado, qualquer validade
        assert!(below_cost_allowed(custo, custo, 400));
    }
}
