// src/services/inventory_service.rs

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{BatchRepository, MedicineRepository, MovementRepository},
    db::movement_repo::NewMovement,
    models::inventory::{Batch, BatchStatus, MovementType, ReferenceType},
    services::finance_service::FinanceService,
    services::notification::{NotificationSink, Severity},
};

use crate::models::finance::TransactionKind;

#[derive(Clone)]
pub struct InventoryService {
    batch_repo: BatchRepository,
    medicine_repo: MedicineRepository,
    movement_repo: MovementRepository,
    finance_service: FinanceService,
    notifier: Arc<dyn NotificationSink>,
}

// Relatório da varredura de validade.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirySweepReport {
    pub expired_batches: usize,
}

// Visão de auditoria: o saldo desnormalizado do lote contra a soma do razão.
// Os dois deveriam bater sempre; divergência é sinal de bug ou de ajuste
// manual no banco, e é exposta em vez de silenciosamente confiada.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReconciliation {
    pub batch_id: Uuid,
    pub remaining_quantity: i32,
    pub ledger_balance: i64,
    pub consistent: bool,
}

impl InventoryService {
    pub fn new(
        batch_repo: BatchRepository,
        medicine_repo: MedicineRepository,
        movement_repo: MovementRepository,
        finance_service: FinanceService,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            batch_repo,
            medicine_repo,
            movement_repo,
            finance_service,
            notifier,
        }
    }

    // Prévia FEFO sem trava, para o balcão consultar disponibilidade.
    pub async fn list_sellable(
        &self,
        pool: &PgPool,
        medicine_id: Uuid,
    ) -> Result<Vec<Batch>, AppError> {
        let today = Utc::now().date_naive();
        self.batch_repo.list_sellable(pool, medicine_id, today).await
    }

    // --- SUCATEAMENTO / AVARIA ---
    // Zera o saldo restante do lote e marca o status final. O valor
    // residual volta ao cofre somente se o lote ainda não estava vencido:
    // perda de lote vencido é absorvida, não vira dinheiro novo.
    pub async fn scrap_batch(
        &self,
        pool: &PgPool,
        batch_id: Uuid,
        damaged: bool,
        reason: Option<&str>,
        user: &str,
    ) -> Result<Batch, AppError> {
        let mut tx = pool.begin().await?;

        let batch = self.batch_repo.get_batch_for_update(&mut *tx, batch_id).await?;

        if matches!(batch.status, BatchStatus::Scrapped) {
            return Err(AppError::InvalidState(format!(
                "Lote {batch_id} já foi sucateado"
            )));
        }

        let today = Utc::now().date_naive();
        let was_expired = batch.is_expired(today) || batch.status == BatchStatus::Expired;
        let residual_qty = batch.remaining_quantity;
        let residual_value = batch.residual_value();

        if residual_qty > 0 {
            self.batch_repo
                .withdraw(&mut *tx, batch_id, residual_qty)
                .await?;

            // Baixa vencida entra no razão como EXPIRY; avaria/sucata, DAMAGE.
            let movement_type = if was_expired {
                MovementType::Expiry
            } else {
                MovementType::Damage
            };

            self.movement_repo
                .append(
                    &mut *tx,
                    NewMovement {
                        medicine_id: batch.medicine_id,
                        batch_id: Some(batch_id),
                        movement_type,
                        reference_type: ReferenceType::BatchScrap,
                        reference_id: batch_id,
                        quantity: -residual_qty,
                        reversal_of: None,
                        created_by: user,
                        notes: reason,
                    },
                )
                .await?;
        }

        let final_status = if damaged {
            BatchStatus::Damaged
        } else {
            BatchStatus::Scrapped
        };
        let updated = self
            .batch_repo
            .mark_status(&mut *tx, batch_id, final_status)
            .await?;

        if !was_expired && residual_value > rust_decimal::Decimal::ZERO {
            self.finance_service
                .apply_vault_effect(
                    &mut *tx,
                    TransactionKind::Income,
                    residual_value,
                    ReferenceType::BatchScrap,
                    batch_id,
                    "Ressarcimento de lote sucateado",
                )
                .await?;
        }

        tx.commit().await?;

        tracing::info!(%batch_id, damaged, "Lote baixado do estoque");
        Ok(updated)
    }

    // --- VARREDURA DE VALIDADE ---
    // Marca como EXPIRED todo lote ativo com a validade vencida. A baixa
    // do saldo (e o lançamento no razão) fica para o sucateamento, onde a
    // perda é de fato assumida.
    pub async fn run_expiry_sweep(&self, pool: &PgPool) -> Result<ExpirySweepReport, AppError> {
        let today = Utc::now().date_naive();
        let mut tx = pool.begin().await?;

        let expired = self.batch_repo.list_expired_active(&mut *tx, today).await?;
        for batch in &expired {
            self.batch_repo
                .mark_status(&mut *tx, batch.id, BatchStatus::Expired)
                .await?;
        }

        tx.commit().await?;

        let report = ExpirySweepReport {
            expired_batches: expired.len(),
        };

        if !expired.is_empty() {
            tracing::warn!(total = expired.len(), "Lotes vencidos marcados na varredura");
            // Melhor esforço: a varredura já commitou.
            if let Err(e) = self
                .notifier
                .notify(
                    "Lotes vencidos",
                    &format!("{} lote(s) marcados como vencidos", expired.len()),
                    Severity::Warning,
                )
                .await
            {
                tracing::warn!("Falha ao notificar varredura de validade: {e}");
            }
        }

        Ok(report)
    }

    // --- ALERTA DE ESTOQUE BAIXO ---
    // Disparado depois que uma venda commitou. Melhor esforço por contrato:
    // qualquer falha aqui é logada e descartada, nunca derruba a venda.
    pub async fn refresh_low_stock_alert(&self, pool: &PgPool, medicine_id: Uuid) {
        let result: Result<(), AppError> = async {
            let medicine = self.medicine_repo.get_medicine(pool, medicine_id).await?;
            let total = self.medicine_repo.total_remaining(pool, medicine_id).await?;

            if total <= i64::from(medicine.min_alert_quantity) {
                self.notifier
                    .notify(
                        "Estoque baixo",
                        &format!(
                            "{} com {} unidade(s) restante(s) (alerta em {})",
                            medicine.name, total, medicine.min_alert_quantity
                        ),
                        Severity::Warning,
                    )
                    .await
                    .map_err(AppError::InternalServerError)?;
            }
            Ok(())
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(%medicine_id, "Falha no alerta de estoque baixo: {e}");
        }
    }

    // --- RECONCILIAÇÃO ---
    pub async fn reconcile_batch(
        &self,
        pool: &PgPool,
        batch_id: Uuid,
    ) -> Result<BatchReconciliation, AppError> {
        let batch = self.batch_repo.get_batch(pool, batch_id).await?;
        let ledger_balance = self
            .movement_repo
            .current_balance(pool, batch.medicine_id, Some(batch_id))
            .await?;

        Ok(BatchReconciliation {
            batch_id,
            remaining_quantity: batch.remaining_quantity,
            ledger_balance,
            consistent: i64::from(batch.remaining_quantity) == ledger_balance,
        })
    }

    pub async fn ledger_balance(
        &self,
        pool: &PgPool,
        medicine_id: Uuid,
        batch_id: Option<Uuid>,
    ) -> Result<i64, AppError> {
        self.movement_repo
            .current_balance(pool, medicine_id, batch_id)
            .await
    }
}
