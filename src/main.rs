//src/main.rs

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;

mod common;
mod config;
mod db;
mod handlers;
mod models;
mod services;

use crate::config::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).compact().init();

    // .expect() é bom aqui: se a configuração falhar, a aplicação não deve iniciar.
    let app_state = AppState::new()
        .await
        .expect("Falha ao inicializar o estado da aplicação.");

    // Roda as migrações do SQLx na inicialização
    sqlx::migrate!()
        .run(&app_state.db_pool)
        .await
        .expect("Falha ao rodar as migrações do banco de dados.");

    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    // Varredura de validade em segundo plano: marca lotes vencidos
    // periodicamente; falha é logada e a próxima rodada tenta de novo.
    {
        let state = app_state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(state.sweep_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = state.inventory_service.run_expiry_sweep(&state.db_pool).await {
                    tracing::error!("Falha na varredura de validade: {e}");
                }
            }
        });
    }

    // Ciclo de vida dos documentos: criação por tipo + transições de status
    let document_routes = Router::new()
        .route("/sales", post(handlers::documents::create_sale_invoice))
        .route("/purchases", post(handlers::documents::create_purchase_invoice))
        .route("/sales-returns", post(handlers::documents::create_sales_return))
        .route(
            "/purchase-returns",
            post(handlers::documents::create_purchase_return),
        )
        .route(
            "/{id}",
            get(handlers::documents::get_document)
                .put(handlers::documents::update_draft_document)
                .delete(handlers::documents::delete_draft_document),
        )
        .route("/{id}/approve", post(handlers::documents::approve_document))
        .route("/{id}/cancel", post(handlers::documents::cancel_document))
        .route(
            "/{id}/unapprove",
            post(handlers::documents::unapprove_sale_invoice),
        );

    let inventory_routes = Router::new()
        .route(
            "/batches/{id}/scrap",
            post(handlers::inventory::scrap_batch),
        )
        .route(
            "/batches/{id}/reconciliation",
            get(handlers::inventory::reconcile_batch),
        )
        .route(
            "/medicines/{id}/sellable-batches",
            get(handlers::inventory::list_sellable_batches),
        )
        .route(
            "/medicines/{id}/ledger-balance",
            get(handlers::inventory::medicine_ledger_balance),
        )
        .route("/expiry-sweep", post(handlers::inventory::run_expiry_sweep));

    let finance_routes = Router::new().route("/vault", get(handlers::finance::get_vault));

    // Combina tudo no router principal
    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/documents", document_routes)
        .nest("/api/inventory", inventory_routes)
        .nest("/api/finance", finance_routes)
        .with_state(app_state);

    // Inicia o servidor
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Falha ao iniciar o listener TCP");
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr().unwrap());
    axum::serve(listener, app)
        .await
        .expect("Erro no servidor Axum");
}
