// src/services/document_service.rs

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{
        document_repo::NewLine, movement_repo::NewMovement, BatchRepository, DocumentRepository,
        MovementRepository, PartnerRepository, SequenceRepository,
    },
    models::documents::{
        below_cost_allowed, Document, DocumentKind, DocumentLine, DocumentStatus, PaymentMethod,
        BELOW_COST_SHELF_DAYS,
    },
    services::{
        allocation, finance_service::FinanceService, inventory_service::InventoryService,
    },
};

// --- COMANDOS ---
// Uma linha pedida pelo chamador. Os campos opcionais dependem do tipo:
// venda pede medicamento + preço (lote escaneado é opcional); compra pede
// medicamento + custo + validade do lote a receber; devolução pede apenas
// a linha de origem e a quantidade.
#[derive(Debug, Clone)]
pub struct LineCommand {
    pub medicine_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Option<Decimal>,
    pub unit_cost: Option<Decimal>,
    pub expiry_date: Option<NaiveDate>,
    pub barcode: Option<String>,
    pub origin_line_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct CreateDocumentCommand {
    pub kind: DocumentKind,
    pub partner_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub payment_method: PaymentMethod,
    pub origin_document_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_by: String,
    pub lines: Vec<LineCommand>,
}

// Documento completo devolvido aos handlers: cabeçalho + divisão por lote.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentWithLines {
    #[serde(flatten)]
    pub header: Document,
    pub lines: Vec<DocumentLine>,
}

#[derive(Clone)]
pub struct DocumentService {
    document_repo: DocumentRepository,
    batch_repo: BatchRepository,
    movement_repo: MovementRepository,
    partner_repo: PartnerRepository,
    sequence_repo: SequenceRepository,
    finance_service: FinanceService,
    inventory_service: InventoryService,
}

impl DocumentService {
    pub fn new(
        document_repo: DocumentRepository,
        batch_repo: BatchRepository,
        movement_repo: MovementRepository,
        partner_repo: PartnerRepository,
        sequence_repo: SequenceRepository,
        finance_service: FinanceService,
        inventory_service: InventoryService,
    ) -> Self {
        Self {
            document_repo,
            batch_repo,
            movement_repo,
            partner_repo,
            sequence_repo,
            finance_service,
            inventory_service,
        }
    }

    // --- CRIAÇÃO (rascunho) ---

    pub async fn create_document(
        &self,
        pool: &PgPool,
        cmd: CreateDocumentCommand,
    ) -> Result<DocumentWithLines, AppError> {
        validate_lines_basic(&cmd.lines)?;

        let mut tx = pool.begin().await?;

        // Cabeçalho validado por tipo; devoluções herdam parceiro e
        // forma de pagamento da fatura de origem.
        let (partner_id, customer_name, payment_method, origin_document_id) =
            self.validate_header(&mut *tx, &cmd).await?;

        let year = Utc::now().year();
        let number = self
            .sequence_repo
            .next_number(&mut *tx, cmd.kind.number_prefix(), year)
            .await?;

        let document = self
            .document_repo
            .insert_document(
                &mut *tx,
                cmd.kind,
                &number,
                partner_id,
                customer_name.as_deref(),
                payment_method,
                origin_document_id,
                cmd.notes.as_deref(),
                &cmd.created_by,
            )
            .await?;

        let lines = self.insert_lines(&mut *tx, &document, &cmd.lines).await?;

        let (amount, cost, profit) = draft_totals(cmd.kind, &lines);
        let header = self
            .document_repo
            .set_totals(&mut *tx, document.id, amount, cost, profit)
            .await?;

        tx.commit().await?;

        tracing::info!(number = %header.number, "Documento criado em rascunho");
        Ok(DocumentWithLines { header, lines })
    }

    async fn validate_header(
        &self,
        conn: &mut PgConnection,
        cmd: &CreateDocumentCommand,
    ) -> Result<(Option<Uuid>, Option<String>, PaymentMethod, Option<Uuid>), AppError> {
        match cmd.kind {
            DocumentKind::SaleInvoice => {
                match cmd.partner_id {
                    Some(pid) => {
                        self.partner_repo
                            .get_partner(&mut *conn, pid, cmd.kind.partner_kind())
                            .await?;
                    }
                    None => {
                        // Venda balcão: só à vista, e com o nome do comprador.
                        if cmd.payment_method != PaymentMethod::Cash {
                            return Err(AppError::BadRequest(
                                "Venda sem cliente cadastrado deve ser à vista".into(),
                            ));
                        }
                        if cmd
                            .customer_name
                            .as_deref()
                            .map(str::trim)
                            .unwrap_or_default()
                            .is_empty()
                        {
                            return Err(AppError::BadRequest(
                                "Venda balcão exige o nome do cliente".into(),
                            ));
                        }
                    }
                }
                Ok((
                    cmd.partner_id,
                    cmd.customer_name.clone(),
                    cmd.payment_method,
                    None,
                ))
            }
            DocumentKind::PurchaseInvoice => {
                let pid = cmd
                    .partner_id
                    .ok_or_else(|| AppError::BadRequest("Compra exige fornecedor".into()))?;
                self.partner_repo
                    .get_partner(&mut *conn, pid, cmd.kind.partner_kind())
                    .await?;
                Ok((Some(pid), None, cmd.payment_method, None))
            }
            DocumentKind::SalesReturn | DocumentKind::PurchaseReturn => {
                let origin_id = cmd.origin_document_id.ok_or_else(|| {
                    AppError::BadRequest("Devolução exige o documento de origem".into())
                })?;
                let origin = self.document_repo.get_document(&mut *conn, origin_id).await?;

                if Some(origin.kind) != cmd.kind.origin_kind() {
                    return Err(AppError::BadRequest(
                        "Tipo do documento de origem não corresponde à devolução".into(),
                    ));
                }
                if origin.status != DocumentStatus::Approved {
                    return Err(AppError::InvalidState(
                        "Devolução só referencia documento aprovado".into(),
                    ));
                }

                // Estorno financeiro espelha como a origem foi paga.
                Ok((
                    origin.partner_id,
                    origin.customer_name.clone(),
                    origin.payment_method,
                    Some(origin_id),
                ))
            }
        }
    }

    async fn insert_lines(
        &self,
        conn: &mut PgConnection,
        document: &Document,
        lines: &[LineCommand],
    ) -> Result<Vec<DocumentLine>, AppError> {
        let today = Utc::now().date_naive();
        let mut created = Vec::with_capacity(lines.len());

        for line in lines {
            let new_line = match document.kind {
                DocumentKind::SaleInvoice => {
                    let medicine_id = line.medicine_id.ok_or_else(|| {
                        AppError::BadRequest("Linha de venda exige medicamento".into())
                    })?;
                    let unit_price = line.unit_price.ok_or_else(|| {
                        AppError::BadRequest("Linha de venda exige preço unitário".into())
                    })?;
                    if unit_price < Decimal::ZERO {
                        return Err(AppError::BadRequest("Preço não pode ser negativo".into()));
                    }
                    // Lote escaneado precisa pertencer ao medicamento.
                    if let Some(batch_id) = line.batch_id {
                        let batch = self.batch_repo.get_batch(&mut *conn, batch_id).await?;
                        if batch.medicine_id != medicine_id {
                            return Err(AppError::BadRequest(
                                "Lote escaneado não pertence ao medicamento".into(),
                            ));
                        }
                    }
                    NewLine {
                        medicine_id,
                        batch_id: line.batch_id,
                        quantity: line.quantity,
                        unit_price,
                        // O custo real só é conhecido na alocação por lote.
                        unit_cost: Decimal::ZERO,
                        origin_line_id: None,
                        incoming_expiry_date: None,
                        incoming_barcode: None,
                    }
                }
                DocumentKind::PurchaseInvoice => {
                    let medicine_id = line.medicine_id.ok_or_else(|| {
                        AppError::BadRequest("Linha de compra exige medicamento".into())
                    })?;
                    let unit_cost = line.unit_cost.ok_or_else(|| {
                        AppError::BadRequest("Linha de compra exige custo unitário".into())
                    })?;
                    if unit_cost < Decimal::ZERO {
                        return Err(AppError::BadRequest("Custo não pode ser negativo".into()));
                    }
                    let expiry = line.expiry_date.ok_or_else(|| {
                        AppError::BadRequest("Linha de compra exige validade do lote".into())
                    })?;
                    if expiry <= today {
                        return Err(AppError::BadRequest(
                            "Validade do lote recebido já passou".into(),
                        ));
                    }
                    NewLine {
                        medicine_id,
                        batch_id: None,
                        quantity: line.quantity,
                        unit_price: unit_cost,
                        unit_cost,
                        origin_line_id: None,
                        incoming_expiry_date: Some(expiry),
                        incoming_barcode: line.barcode.as_deref(),
                    }
                }
                DocumentKind::SalesReturn | DocumentKind::PurchaseReturn => {
                    let origin_line_id = line.origin_line_id.ok_or_else(|| {
                        AppError::BadRequest("Linha de devolução exige a linha de origem".into())
                    })?;
                    let origin_line =
                        self.document_repo.get_line(&mut *conn, origin_line_id).await?;

                    if Some(origin_line.document_id) != document.origin_document_id {
                        return Err(AppError::BadRequest(
                            "Linha de origem não pertence ao documento de origem".into(),
                        ));
                    }
                    // Checagem antecipada; revalidada sob trava na aprovação.
                    if line.quantity > origin_line.remaining_qty_to_return {
                        return Err(AppError::OverReturn);
                    }

                    NewLine {
                        medicine_id: origin_line.medicine_id,
                        batch_id: origin_line.batch_id,
                        quantity: line.quantity,
                        unit_price: origin_line.unit_price,
                        unit_cost: origin_line.unit_cost,
                        origin_line_id: Some(origin_line_id),
                        incoming_expiry_date: None,
                        incoming_barcode: None,
                    }
                }
            };

            created.push(
                self.document_repo
                    .insert_line(&mut *conn, document.id, new_line)
                    .await?,
            );
        }

        Ok(created)
    }

    // --- EDIÇÃO / EXCLUSÃO (rascunho apenas) ---

    pub async fn update_draft_document(
        &self,
        pool: &PgPool,
        document_id: Uuid,
        cmd: CreateDocumentCommand,
    ) -> Result<DocumentWithLines, AppError> {
        validate_lines_basic(&cmd.lines)?;

        let mut tx = pool.begin().await?;

        let document = self
            .document_repo
            .get_document_for_update(&mut *tx, document_id)
            .await?;

        if !document.status.is_editable() {
            return Err(AppError::InvalidState(format!(
                "Documento {} não é mais editável",
                document.number
            )));
        }
        if document.kind != cmd.kind {
            return Err(AppError::BadRequest(
                "Tipo do documento não pode mudar na edição".into(),
            ));
        }

        let (partner_id, customer_name, payment_method, _origin) =
            self.validate_header(&mut *tx, &cmd).await?;

        let header = self
            .document_repo
            .update_draft_header(
                &mut *tx,
                document_id,
                partner_id,
                customer_name.as_deref(),
                payment_method,
                cmd.notes.as_deref(),
            )
            .await?;

        self.document_repo.delete_lines(&mut *tx, document_id).await?;
        let lines = self.insert_lines(&mut *tx, &header, &cmd.lines).await?;

        let (amount, cost, profit) = draft_totals(header.kind, &lines);
        let header = self
            .document_repo
            .set_totals(&mut *tx, document_id, amount, cost, profit)
            .await?;

        tx.commit().await?;
        Ok(DocumentWithLines { header, lines })
    }

    pub async fn delete_draft_document(
        &self,
        pool: &PgPool,
        document_id: Uuid,
    ) -> Result<(), AppError> {
        let mut tx = pool.begin().await?;

        let document = self
            .document_repo
            .get_document_for_update(&mut *tx, document_id)
            .await?;
        if !document.status.is_editable() {
            return Err(AppError::InvalidState(format!(
                "Documento {} não pode ser apagado depois de aprovado",
                document.number
            )));
        }

        self.document_repo.delete_document(&mut *tx, document_id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_document_with_lines(
        &self,
        pool: &PgPool,
        document_id: Uuid,
    ) -> Result<DocumentWithLines, AppError> {
        let header = self.document_repo.get_document(pool, document_id).await?;
        let lines = self.document_repo.get_lines(pool, document_id).await?;
        Ok(DocumentWithLines { header, lines })
    }

    // --- APROVAÇÃO ---
    // Uma transação única: alocação, reservas de lote, razão, cofre e
    // dívida de parceiro commitam juntos ou nada é aplicado.
    pub async fn approve_document(
        &self,
        pool: &PgPool,
        document_id: Uuid,
        user: &str,
    ) -> Result<DocumentWithLines, AppError> {
        let mut tx = pool.begin().await?;

        let document = self
            .document_repo
            .get_document_for_update(&mut *tx, document_id)
            .await?;
        if !document.status.can_approve() {
            return Err(AppError::InvalidState(format!(
                "Documento {} não está em rascunho",
                document.number
            )));
        }

        let lines = self.document_repo.get_lines(&mut *tx, document_id).await?;
        if lines.is_empty() {
            return Err(AppError::BadRequest("Documento sem linhas".into()));
        }

        let touched_medicines = match document.kind {
            DocumentKind::SaleInvoice => {
                self.approve_sale(&mut *tx, &document, &lines, user).await?
            }
            DocumentKind::PurchaseInvoice => {
                self.approve_purchase(&mut *tx, &document, &lines, user).await?
            }
            DocumentKind::SalesReturn | DocumentKind::PurchaseReturn => {
                self.approve_return(&mut *tx, &document, &lines, user).await?
            }
        };

        let header = self
            .document_repo
            .set_status(&mut *tx, document_id, DocumentStatus::Approved)
            .await?;

        tx.commit().await?;
        tracing::info!(number = %header.number, "Documento aprovado");

        // Pós-commit, melhor esforço: o alerta de estoque baixo jamais
        // bloqueia ou desfaz a venda que acabou de commitar.
        if header.kind == DocumentKind::SaleInvoice {
            let inventory = self.inventory_service.clone();
            let pool = pool.clone();
            tokio::spawn(async move {
                for medicine_id in touched_medicines {
                    inventory.refresh_low_stock_alert(&pool, medicine_id).await;
                }
            });
        }

        self.get_document_with_lines(pool, document_id).await
    }

    // Venda: cada linha pedida passa pelo motor FEFO e vira uma ou mais
    // linhas físicas, uma por lote consumido, com o custo daquele lote.
    async fn approve_sale(
        &self,
        conn: &mut PgConnection,
        document: &Document,
        lines: &[DocumentLine],
        user: &str,
    ) -> Result<Vec<Uuid>, AppError> {
        let today = Utc::now().date_naive();

        struct ConcreteLine {
            medicine_id: Uuid,
            batch_id: Uuid,
            quantity: i32,
            unit_price: Decimal,
            unit_cost: Decimal,
        }
        let mut concrete: Vec<ConcreteLine> = Vec::new();

        for line in lines {
            // Trava e lê o retrato FEFO já refletindo as reservas das
            // linhas anteriores deste mesmo documento.
            let sellable = self
                .batch_repo
                .find_sellable_fefo(&mut *conn, line.medicine_id, today)
                .await?;

            let allocations = allocation::allocate(line.quantity, line.batch_id, &sellable)?;

            for alloc in allocations {
                let batch = sellable
                    .iter()
                    .find(|b| b.id == alloc.batch_id)
                    .ok_or_else(|| {
                        AppError::InternalServerError(anyhow::anyhow!(
                            "Alocação apontou para lote fora do retrato"
                        ))
                    })?;

                if !below_cost_allowed(
                    line.unit_price,
                    alloc.unit_cost,
                    batch.days_until_expiry(today),
                ) {
                    return Err(AppError::BelowCostSale {
                        threshold_days: BELOW_COST_SHELF_DAYS,
                    });
                }

                self.batch_repo
                    .reserve(&mut *conn, alloc.batch_id, alloc.quantity)
                    .await?;

                self.movement_repo
                    .append(
                        &mut *conn,
                        NewMovement {
                            medicine_id: line.medicine_id,
                            batch_id: Some(alloc.batch_id),
                            movement_type: document.kind.movement_type(),
                            reference_type: document.kind.reference_type(),
                            reference_id: document.id,
                            quantity: -alloc.quantity,
                            reversal_of: None,
                            created_by: user,
                            notes: None,
                        },
                    )
                    .await?;

                concrete.push(ConcreteLine {
                    medicine_id: line.medicine_id,
                    batch_id: alloc.batch_id,
                    quantity: alloc.quantity,
                    unit_price: line.unit_price,
                    unit_cost: alloc.unit_cost,
                });
            }
        }

        // Reescreve as linhas: o pedido lógico vira a divisão física.
        self.document_repo.delete_lines(&mut *conn, document.id).await?;
        for c in &concrete {
            self.document_repo
                .insert_line(
                    &mut *conn,
                    document.id,
                    NewLine {
                        medicine_id: c.medicine_id,
                        batch_id: Some(c.batch_id),
                        quantity: c.quantity,
                        unit_price: c.unit_price,
                        unit_cost: c.unit_cost,
                        origin_line_id: None,
                        incoming_expiry_date: None,
                        incoming_barcode: None,
                    },
                )
                .await?;
        }
        self.document_repo
            .set_lines_returnable(&mut *conn, document.id, true)
            .await?;

        let amount: Decimal = concrete
            .iter()
            .map(|c| Decimal::from(c.quantity) * c.unit_price)
            .sum();
        let cost: Decimal = concrete
            .iter()
            .map(|c| Decimal::from(c.quantity) * c.unit_cost)
            .sum();
        self.document_repo
            .set_totals(&mut *conn, document.id, amount, cost, amount - cost)
            .await?;

        match document.payment_method {
            PaymentMethod::Cash => {
                self.finance_service
                    .apply_vault_effect(
                        &mut *conn,
                        document.kind.vault_effect(),
                        amount,
                        document.kind.reference_type(),
                        document.id,
                        &format!("Venda {}", document.number),
                    )
                    .await?;
            }
            PaymentMethod::Credit => {
                let partner_id = document.partner_id.ok_or_else(|| {
                    AppError::BadRequest("Venda a prazo exige cliente cadastrado".into())
                })?;
                // Checagem de limite + incremento da dívida, sob trava.
                self.finance_service
                    .apply_partner_debt(
                        &mut *conn,
                        partner_id,
                        document.kind.partner_kind(),
                        amount * Decimal::from(document.kind.debt_sign()),
                    )
                    .await?;
            }
        }

        let mut medicines: Vec<Uuid> = concrete.iter().map(|c| c.medicine_id).collect();
        medicines.sort();
        medicines.dedup();
        Ok(medicines)
    }

    // Compra: o cofre é debitado antes de qualquer lote existir; compra
    // que não dá para pagar é rejeitada inteira, nunca aplicada pela metade.
    async fn approve_purchase(
        &self,
        conn: &mut PgConnection,
        document: &Document,
        lines: &[DocumentLine],
        user: &str,
    ) -> Result<Vec<Uuid>, AppError> {
        let total: Decimal = lines.iter().map(DocumentLine::line_cost).sum();

        match document.payment_method {
            PaymentMethod::Cash => {
                self.finance_service
                    .apply_vault_effect(
                        &mut *conn,
                        document.kind.vault_effect(),
                        total,
                        document.kind.reference_type(),
                        document.id,
                        &format!("Compra {}", document.number),
                    )
                    .await?;
            }
            PaymentMethod::Credit => {
                let partner_id = document
                    .partner_id
                    .ok_or_else(|| AppError::BadRequest("Compra exige fornecedor".into()))?;
                self.finance_service
                    .apply_partner_debt(
                        &mut *conn,
                        partner_id,
                        document.kind.partner_kind(),
                        total * Decimal::from(document.kind.debt_sign()),
                    )
                    .await?;
            }
        }

        for line in lines {
            let expiry = line.incoming_expiry_date.ok_or_else(|| {
                AppError::BadRequest("Linha de compra sem validade do lote".into())
            })?;

            let batch = self
                .batch_repo
                .create_batch(
                    &mut *conn,
                    line.medicine_id,
                    line.quantity,
                    line.unit_cost,
                    expiry,
                    line.incoming_barcode.as_deref(),
                )
                .await?;

            self.document_repo
                .set_line_batch(&mut *conn, line.id, batch.id)
                .await?;

            self.movement_repo
                .append(
                    &mut *conn,
                    NewMovement {
                        medicine_id: line.medicine_id,
                        batch_id: Some(batch.id),
                        movement_type: document.kind.movement_type(),
                        reference_type: document.kind.reference_type(),
                        reference_id: document.id,
                        quantity: line.quantity,
                        reversal_of: None,
                        created_by: user,
                        notes: None,
                    },
                )
                .await?;
        }

        self.document_repo
            .set_lines_returnable(&mut *conn, document.id, true)
            .await?;
        self.document_repo
            .set_totals(&mut *conn, document.id, total, total, Decimal::ZERO)
            .await?;

        let mut medicines: Vec<Uuid> = lines.iter().map(|l| l.medicine_id).collect();
        medicines.sort();
        medicines.dedup();
        Ok(medicines)
    }

    // Devolução: revalida cada linha contra o saldo devolvível da origem,
    // devolve/retira estoque, reverte a parcela proporcional na fatura de
    // origem e espelha o efeito financeiro.
    async fn approve_return(
        &self,
        conn: &mut PgConnection,
        document: &Document,
        lines: &[DocumentLine],
        user: &str,
    ) -> Result<Vec<Uuid>, AppError> {
        let origin_id = document
            .origin_document_id
            .ok_or_else(|| AppError::BadRequest("Devolução sem documento de origem".into()))?;
        let origin = self
            .document_repo
            .get_document_for_update(&mut *conn, origin_id)
            .await?;
        if origin.status != DocumentStatus::Approved {
            return Err(AppError::InvalidState(
                "Documento de origem não está mais aprovado".into(),
            ));
        }

        let mut amount = Decimal::ZERO;
        let mut cost = Decimal::ZERO;

        for line in lines {
            let origin_line_id = line.origin_line_id.ok_or_else(|| {
                AppError::BadRequest("Linha de devolução sem linha de origem".into())
            })?;
            let origin_line = self
                .document_repo
                .get_line_for_update(&mut *conn, origin_line_id)
                .await?;

            if line.quantity > origin_line.remaining_qty_to_return {
                return Err(AppError::OverReturn);
            }
            let batch_id = origin_line.batch_id.ok_or_else(|| {
                AppError::InvalidState("Linha de origem sem lote amarrado".into())
            })?;

            match document.kind {
                DocumentKind::SalesReturn => {
                    self.batch_repo.release(&mut *conn, batch_id, line.quantity).await?;
                }
                DocumentKind::PurchaseReturn => {
                    // Lote que já vendeu qualquer unidade não volta ao
                    // fornecedor inteiro e rastreável.
                    let batch = self
                        .batch_repo
                        .get_batch_for_update(&mut *conn, batch_id)
                        .await?;
                    if batch.sold_quantity > 0 {
                        return Err(AppError::InvalidState(format!(
                            "Lote {batch_id} já possui vendas e não pode ser devolvido"
                        )));
                    }
                    self.batch_repo.withdraw(&mut *conn, batch_id, line.quantity).await?;
                }
                DocumentKind::SaleInvoice | DocumentKind::PurchaseInvoice => {
                    return Err(AppError::InternalServerError(anyhow::anyhow!(
                        "approve_return chamado para documento que não é devolução"
                    )));
                }
            }

            self.movement_repo
                .append(
                    &mut *conn,
                    NewMovement {
                        medicine_id: origin_line.medicine_id,
                        batch_id: Some(batch_id),
                        movement_type: document.kind.movement_type(),
                        reference_type: document.kind.reference_type(),
                        reference_id: document.id,
                        quantity: line.quantity * document.kind.stock_sign(),
                        reversal_of: None,
                        created_by: user,
                        notes: None,
                    },
                )
                .await?;

            self.document_repo
                .adjust_line_remaining_return(&mut *conn, origin_line_id, -line.quantity)
                .await?;

            amount += Decimal::from(line.quantity) * origin_line.unit_price;
            cost += Decimal::from(line.quantity) * origin_line.unit_cost;
        }

        let profit = amount - cost;

        // A fatura de origem encolhe na exata proporção devolvida.
        self.document_repo
            .add_totals(&mut *conn, origin_id, -amount, -cost, -profit)
            .await?;
        self.document_repo
            .set_totals(&mut *conn, document.id, amount, cost, profit)
            .await?;

        match document.payment_method {
            PaymentMethod::Cash => {
                self.finance_service
                    .apply_vault_effect(
                        &mut *conn,
                        document.kind.vault_effect(),
                        amount,
                        document.kind.reference_type(),
                        document.id,
                        &format!("Devolução {}", document.number),
                    )
                    .await?;
            }
            PaymentMethod::Credit => {
                let partner_id = document.partner_id.ok_or_else(|| {
                    AppError::InvalidState("Devolução a prazo sem parceiro".into())
                })?;
                self.finance_service
                    .apply_partner_debt(
                        &mut *conn,
                        partner_id,
                        document.kind.partner_kind(),
                        amount * Decimal::from(document.kind.debt_sign()),
                    )
                    .await?;
            }
        }

        let mut medicines: Vec<Uuid> = lines.iter().map(|l| l.medicine_id).collect();
        medicines.sort();
        medicines.dedup();
        Ok(medicines)
    }

    // --- ESTORNO (cancelar / desaprovar) ---

    pub async fn cancel_document(
        &self,
        pool: &PgPool,
        document_id: Uuid,
        user: &str,
    ) -> Result<DocumentWithLines, AppError> {
        self.reverse_document(pool, document_id, user, DocumentStatus::Cancelled)
            .await
    }

    // Desaprovação devolve a fatura de venda ao rascunho, para correção.
    pub async fn unapprove_sale_invoice(
        &self,
        pool: &PgPool,
        document_id: Uuid,
        user: &str,
    ) -> Result<DocumentWithLines, AppError> {
        self.reverse_document(pool, document_id, user, DocumentStatus::Draft)
            .await
    }

    // Replay espelhado de todos os efeitos da aprovação, na mesma
    // transação: estoque, razão (movimentos com sinal trocado apontando
    // para os originais), cofre e dívida de parceiro.
    async fn reverse_document(
        &self,
        pool: &PgPool,
        document_id: Uuid,
        user: &str,
        target: DocumentStatus,
    ) -> Result<DocumentWithLines, AppError> {
        let mut tx = pool.begin().await?;

        let document = self
            .document_repo
            .get_document_for_update(&mut *tx, document_id)
            .await?;

        if !document.status.can_reverse() {
            return Err(AppError::InvalidState(format!(
                "Documento {} não está aprovado",
                document.number
            )));
        }
        if target == DocumentStatus::Draft && document.kind != DocumentKind::SaleInvoice {
            return Err(AppError::InvalidState(
                "Desaprovação é exclusiva de fatura de venda".into(),
            ));
        }
        if self
            .document_repo
            .has_noncancelled_returns(&mut *tx, document_id)
            .await?
        {
            return Err(AppError::HasDependentReturns);
        }

        let lines = self.document_repo.get_lines(&mut *tx, document_id).await?;

        // 1. Estoque: inverso exato por linha física.
        for line in &lines {
            let batch_id = line.batch_id.ok_or_else(|| {
                AppError::InvalidState("Linha aprovada sem lote amarrado".into())
            })?;
            match document.kind {
                DocumentKind::SaleInvoice => {
                    self.batch_repo.release(&mut *tx, batch_id, line.quantity).await?;
                }
                DocumentKind::PurchaseInvoice => {
                    // Se parte do lote já foi vendida, o desfazimento não
                    // fecha a conta e a guarda da query rejeita o estorno.
                    self.batch_repo.withdraw(&mut *tx, batch_id, line.quantity).await?;
                }
                DocumentKind::SalesReturn => {
                    self.batch_repo.reserve(&mut *tx, batch_id, line.quantity).await?;
                }
                DocumentKind::PurchaseReturn => {
                    self.batch_repo.restock(&mut *tx, batch_id, line.quantity).await?;
                }
            }
        }

        // 2. Razão: movimento espelhado para cada original ainda não
        // estornado, com `reversal_of` amarrando o par.
        let movements = self
            .movement_repo
            .movements_for(&mut *tx, document.kind.reference_type(), document_id)
            .await?;
        let already_reversed: HashSet<Uuid> =
            movements.iter().filter_map(|m| m.reversal_of).collect();

        for movement in movements
            .iter()
            .filter(|m| m.reversal_of.is_none() && !already_reversed.contains(&m.id))
        {
            let note = format!("Estorno da movimentação {}", movement.id);
            self.movement_repo
                .append(
                    &mut *tx,
                    NewMovement {
                        medicine_id: movement.medicine_id,
                        batch_id: movement.batch_id,
                        movement_type: movement.movement_type,
                        reference_type: movement.reference_type,
                        reference_id: document_id,
                        quantity: -movement.quantity,
                        reversal_of: Some(movement.id),
                        created_by: user,
                        notes: Some(note.as_str()),
                    },
                )
                .await?;
        }

        // 3. Financeiro: o inverso do que a aprovação lançou, garantido
        // único pelo pareamento estrito Approved -> estorno da máquina
        // de estados.
        if document.amount > Decimal::ZERO {
            match document.payment_method {
                PaymentMethod::Cash => {
                    self.finance_service
                        .apply_vault_effect(
                            &mut *tx,
                            document.kind.vault_effect().inverse(),
                            document.amount,
                            document.kind.reference_type(),
                            document_id,
                            &format!("Estorno {}", document.number),
                        )
                        .await?;
                }
                PaymentMethod::Credit => {
                    if let Some(partner_id) = document.partner_id {
                        self.finance_service
                            .apply_partner_debt(
                                &mut *tx,
                                partner_id,
                                document.kind.partner_kind(),
                                document.amount * Decimal::from(-document.kind.debt_sign()),
                            )
                            .await?;
                    }
                }
            }
        }

        // 4. Devolução estornada restitui o saldo devolvível e os totais
        // da fatura de origem.
        if document.kind.is_return() {
            if let Some(origin_id) = document.origin_document_id {
                for line in &lines {
                    if let Some(origin_line_id) = line.origin_line_id {
                        self.document_repo
                            .adjust_line_remaining_return(&mut *tx, origin_line_id, line.quantity)
                            .await?;
                    }
                }
                self.document_repo
                    .add_totals(
                        &mut *tx,
                        origin_id,
                        document.amount,
                        document.cost,
                        document.profit,
                    )
                    .await?;
            }
        }

        // Nada mais é devolvível depois do estorno.
        self.document_repo
            .set_lines_returnable(&mut *tx, document_id, false)
            .await?;

        let header = self
            .document_repo
            .set_status(&mut *tx, document_id, target)
            .await?;

        tx.commit().await?;
        tracing::info!(number = %header.number, ?target, "Documento estornado");

        self.get_document_with_lines(pool, document_id).await
    }
}

fn validate_lines_basic(lines: &[LineCommand]) -> Result<(), AppError> {
    if lines.is_empty() {
        return Err(AppError::BadRequest("Documento sem linhas".into()));
    }
    for line in lines {
        if line.quantity <= 0 {
            return Err(AppError::BadRequest(
                "Quantidade da linha deve ser positiva".into(),
            ));
        }
    }
    Ok(())
}

// Totais de rascunho: a venda ainda não conhece o custo real (só a
// alocação por lote decide), então custo/lucro ficam zerados até aprovar.
fn draft_totals(kind: DocumentKind, lines: &[DocumentLine]) -> (Decimal, Decimal, Decimal) {
    let amount: Decimal = lines.iter().map(DocumentLine::line_amount).sum();
    match kind {
        DocumentKind::SaleInvoice => (amount, Decimal::ZERO, Decimal::ZERO),
        DocumentKind::PurchaseInvoice => (amount, amount, Decimal::ZERO),
        DocumentKind::SalesReturn | DocumentKind::PurchaseReturn => {
            let cost: Decimal = lines.iter().map(DocumentLine::line_cost).sum();
            (amount, cost, amount - cost)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linha(qty: i32, preco_centavos: i64, custo_centavos: i64) -> DocumentLine {
        DocumentLine {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            medicine_id: Uuid::new_v4(),
            batch_id: None,
            quantity: qty,
            unit_price: Decimal::new(preco_centavos, 2),
            unit_cost: Decimal::new(custo_centavos, 2),
            remaining_qty_to_return: qty,
            origin_line_id: None,
            incoming_expiry_date: None,
            incoming_barcode: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn totais_de_rascunho_por_tipo() {
        let lines = vec![linha(10, 500, 300), linha(5, 200, 100)];

        // venda: 10*5.00 + 5*2.00 = 60.00, custo desconhecido no rascunho
        let (amount, cost, profit) = draft_totals(DocumentKind::SaleInvoice, &lines);
        assert_eq!(amount, Decimal::new(6000, 2));
        assert_eq!(cost, Decimal::ZERO);
        assert_eq!(profit, Decimal::ZERO);

        // compra: total a pagar = valor = custo
        let (amount, cost, profit) = draft_totals(DocumentKind::PurchaseInvoice, &lines);
        assert_eq!(amount, cost);
        assert_eq!(profit, Decimal::ZERO);

        // devolução: proporcional aos preços/custos herdados da origem
        let (amount, cost, profit) = draft_totals(DocumentKind::SalesReturn, &lines);
        assert_eq!(amount, Decimal::new(6000, 2));
        assert_eq!(cost, Decimal::new(3500, 2)); // 10*3.00 + 5*1.00
        assert_eq!(profit, Decimal::new(2500, 2));
    }

    #[test]
    fn linhas_invalidas_sao_rejeitadas_cedo() {
        assert!(matches!(
            validate_lines_basic(&[]),
            Err(AppError::BadRequest(_))
        ));

        let cmd = LineCommand {
            medicine_id: Some(Uuid::new_v4()),
            batch_id: None,
            quantity: 0,
            unit_price: Some(Decimal::ONE),
            unit_cost: None,
            expiry_date: None,
            barcode: None,
            origin_line_id: None,
        };
        assert!(matches!(
            validate_lines_basic(&[cmd]),
            Err(AppError::BadRequest(_))
        ));
    }
}
