// src/services/allocation.rs

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{common::error::AppError, models::inventory::Batch};

// Resultado concreto da alocação: um par (lote, quantidade) por lote
// consumido. Vira uma linha física do documento, com o custo daquele lote.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchAllocation {
    pub batch_id: Uuid,
    pub quantity: i32,
    pub unit_cost: Decimal,
}

// Motor de alocação FEFO. Função pura: recebe o retrato dos lotes
// vendáveis (já travados pelo chamador) e devolve a divisão exata,
// ou falha sem reter alocação parcial.
//
// Regras:
// 1. Lote preferido (código de barras escaneado no balcão) é consumido
//    primeiro, até onde o saldo dele alcançar.
// 2. O residual segue a ordem de validade mais próxima primeiro,
//    empate desfeito pelo id do lote, esgotando um lote antes de
//    tocar o próximo.
// 3. Residual positivo ao fim = InsufficientStock com o déficit.
pub fn allocate(
    requested: i32,
    preferred_batch: Option<Uuid>,
    sellable: &[Batch],
) -> Result<Vec<BatchAllocation>, AppError> {
    if requested <= 0 {
        return Err(AppError::BadRequest(
            "Quantidade solicitada deve ser positiva".into(),
        ));
    }

    // Reordena defensivamente: a regra de desempate precisa valer
    // mesmo que o chamador não tenha ordenado.
    let mut ordered: Vec<&Batch> = sellable.iter().collect();
    ordered.sort_by(|a, b| {
        a.expiry_date
            .cmp(&b.expiry_date)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut residual = requested;
    let mut allocations: Vec<BatchAllocation> = Vec::new();

    if let Some(preferred_id) = preferred_batch {
        // O lote escaneado precisa estar entre os vendáveis; se saiu de
        // condição (vencendo, em quarentena...), a venda não pode segui-lo.
        let preferred = ordered
            .iter()
            .find(|b| b.id == preferred_id)
            .copied()
            .ok_or_else(|| {
                AppError::InvalidState(format!("Lote {preferred_id} não está vendável"))
            })?;

        let take = residual.min(preferred.remaining_quantity);
        allocations.push(BatchAllocation {
            batch_id: preferred.id,
            quantity: take,
            unit_cost: preferred.unit_purchase_price,
        });
        residual -= take;
    }

    for batch in ordered {
        if residual == 0 {
            break;
        }
        // O preferido já foi consumido acima.
        if allocations.iter().any(|a| a.batch_id == batch.id) {
            continue;
        }
        let take = residual.min(batch.remaining_quantity);
        if take == 0 {
            continue;
        }
        allocations.push(BatchAllocation {
            batch_id: batch.id,
            quantity: take,
            unit_cost: batch.unit_purchase_price,
        });
        residual -= take;
    }

    if residual > 0 {
        return Err(AppError::InsufficientStock { deficit: residual });
    }

    Ok(allocations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::inventory::BatchStatus;
    use chrono::{Duration, NaiveDate, Utc};
    use rstest::rstest;

    fn hoje() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()
    }

    fn lote(id_byte: u8, remaining: i32, dias_para_vencer: i64, custo_centavos: i64) -> Batch {
        Batch {
            id: Uuid::from_bytes([id_byte; 16]),
            medicine_id: Uuid::from_bytes([0xAA; 16]),
            quantity: remaining,
            remaining_quantity: remaining,
            sold_quantity: 0,
            unit_purchase_price: Decimal::new(custo_centavos, 2),
            expiry_date: hoje() + Duration::days(dias_para_vencer),
            status: BatchStatus::Active,
            barcode: None,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn divide_entre_lotes_na_ordem_de_validade() {
        // Lote A vence em 5 dias com 10 unidades; B em 40 dias com 10.
        let a = lote(1, 10, 5, 200);
        let b = lote(2, 10, 40, 300);

        let alloc = allocate(15, None, &[b.clone(), a.clone()]).unwrap();

        assert_eq!(alloc.len(), 2);
        assert_eq!(alloc[0].batch_id, a.id);
        assert_eq!(alloc[0].quantity, 10);
        assert_eq!(alloc[0].unit_cost, Decimal::new(200, 2));
        assert_eq!(alloc[1].batch_id, b.id);
        assert_eq!(alloc[1].quantity, 5);
        assert_eq!(alloc[1].unit_cost, Decimal::new(300, 2));
    }

    #[test]
    fn falha_com_o_deficit_sem_alocacao_parcial() {
        let a = lote(1, 10, 5, 200);
        let b = lote(2, 10, 40, 300);

        let err = allocate(25, None, &[a, b]).unwrap_err();
        match err {
            AppError::InsufficientStock { deficit } => assert_eq!(deficit, 5),
            other => panic!("erro inesperado: {other:?}"),
        }
    }

    #[rstest]
    #[case(1)]
    #[case(10)]
    #[case(20)]
    fn fefo_esgota_o_lote_mais_proximo_antes_do_seguinte(#[case] pedido: i32) {
        let primeiro = lote(1, 10, 3, 100);
        let segundo = lote(2, 10, 20, 100);
        let terceiro = lote(3, 10, 90, 100);

        let alloc = allocate(
            pedido,
            None,
            &[terceiro.clone(), primeiro.clone(), segundo.clone()],
        )
        .unwrap();

        // Enquanto houver residual, o lote de validade mais próxima
        // aparece primeiro e completamente consumido.
        assert_eq!(alloc[0].batch_id, primeiro.id);
        if pedido > 10 {
            assert_eq!(alloc[0].quantity, 10);
            assert_eq!(alloc[1].batch_id, segundo.id);
        }
        let total: i32 = alloc.iter().map(|a| a.quantity).sum();
        assert_eq!(total, pedido);
    }

    #[test]
    fn empate_de_validade_e_resolvido_pelo_id() {
        let x = lote(9, 10, 10, 100);
        let y = lote(1, 10, 10, 100); // mesma validade, id menor

        let alloc = allocate(5, None, &[x.clone(), y.clone()]).unwrap();
        assert_eq!(alloc[0].batch_id, y.id);
    }

    #[test]
    fn lote_preferido_e_consumido_primeiro() {
        let proximo = lote(1, 10, 5, 200);
        let escaneado = lote(2, 10, 40, 300);

        let alloc = allocate(12, Some(escaneado.id), &[proximo.clone(), escaneado.clone()]).unwrap();

        // O balcão escolheu o lote; o residual volta para a regra FEFO.
        assert_eq!(alloc[0].batch_id, escaneado.id);
        assert_eq!(alloc[0].quantity, 10);
        assert_eq!(alloc[1].batch_id, proximo.id);
        assert_eq!(alloc[1].quantity, 2);
    }

    #[test]
    fn lote_preferido_fora_da_lista_de_vendaveis_e_rejeitado() {
        let a = lote(1, 10, 5, 200);
        let fantasma = Uuid::from_bytes([7; 16]);

        let err = allocate(5, Some(fantasma), &[a]).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn quantidade_nao_positiva_e_invalida() {
        let a = lote(1, 10, 5, 200);
        assert!(matches!(
            allocate(0, None, &[a.clone()]),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            allocate(-3, None, &[a]),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn soma_das_alocacoes_e_exatamente_o_pedido() {
        let lotes: Vec<Batch> = (1..=6).map(|i| lote(i, 7, i64::from(i) * 3, 150)).collect();
        for pedido in [1, 7, 8, 21, 42] {
            let alloc = allocate(pedido, None, &lotes).unwrap();
            let total: i32 = alloc.iter().map(|a| a.quantity).sum();
            assert_eq!(total, pedido);
            // nenhum par repete lote
            let mut ids: Vec<Uuid> = alloc.iter().map(|a| a.batch_id).collect();
            ids.dedup();
            assert_eq!(ids.len(), alloc.len());
        }
    }
}
