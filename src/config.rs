// src/config.rs

use std::{env, sync::Arc, time::Duration};

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::{
        AccountRepository, BatchRepository, DocumentRepository, MedicineRepository,
        MovementRepository, PartnerRepository, SequenceRepository,
    },
    services::{
        document_service::DocumentService,
        finance_service::FinanceService,
        inventory_service::InventoryService,
        notification::{LogSink, NotificationSink},
    },
};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub document_service: DocumentService,
    pub inventory_service: InventoryService,
    pub finance_service: FinanceService,
    // Intervalo da varredura de validade em segundo plano.
    pub sweep_interval: Duration,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL deve ser definida");

        let sweep_interval = env::var("EXPIRY_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(3600));

        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Monta o gráfico de dependências ---
        let medicine_repo = MedicineRepository::new(db_pool.clone());
        let batch_repo = BatchRepository::new(db_pool.clone());
        let movement_repo = MovementRepository::new(db_pool.clone());
        let account_repo = AccountRepository::new(db_pool.clone());
        let partner_repo = PartnerRepository::new(db_pool.clone());
        let document_repo = DocumentRepository::new(db_pool.clone());
        let sequence_repo = SequenceRepository::new(db_pool.clone());

        let notifier: Arc<dyn NotificationSink> = Arc::new(LogSink);

        let finance_service = FinanceService::new(account_repo, partner_repo.clone());
        let inventory_service = InventoryService::new(
            batch_repo.clone(),
            medicine_repo,
            movement_repo.clone(),
            finance_service.clone(),
            notifier,
        );
        let document_service = DocumentService::new(
            document_repo,
            batch_repo,
            movement_repo,
            partner_repo,
            sequence_repo,
            finance_service.clone(),
            inventory_service.clone(),
        );

        Ok(Self {
            db_pool,
            document_service,
            inventory_service,
            finance_service,
            sweep_interval,
        })
    }
}
