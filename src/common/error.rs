// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
// Todas as variantes de negócio são recuperáveis: a operação é rejeitada,
// a transação sofre rollback e o documento permanece como estava.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Registro não encontrado: {0}")]
    NotFound(String),

    #[error("Operação ilegal para o estado atual: {0}")]
    InvalidState(String),

    // Carrega o déficit: quanto faltou para atender o pedido.
    #[error("Estoque insuficiente (faltam {deficit} unidades)")]
    InsufficientStock { deficit: i32 },

    #[error("Saldo insuficiente no cofre (faltam {missing})")]
    InsufficientFunds { missing: Decimal },

    #[error("Limite de crédito excedido em {excess}")]
    CreditLimitExceeded { excess: Decimal },

    // Venda abaixo do custo só é liberada para lote com validade a poucos dias.
    #[error("Venda abaixo do custo bloqueada (validade além de {threshold_days} dias)")]
    BelowCostSale { threshold_days: i64 },

    #[error("Documento possui devoluções não canceladas")]
    HasDependentReturns,

    #[error("Quantidade devolvida excede o saldo devolvível da linha")]
    OverReturn,

    #[error("Requisição inválida: {0}")]
    BadRequest(String),

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado.
    // `anyhow::Error` é ótimo para capturar o contexto do erro.
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::InsufficientStock { .. }
            | AppError::InsufficientFunds { .. }
            | AppError::CreditLimitExceeded { .. }
            | AppError::BelowCostSale { .. }
            | AppError::HasDependentReturns
            | AppError::OverReturn => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),

            // Todos os outros erros (DatabaseError, InternalServerError) viram 500.
            // O `tracing` loga a mensagem detalhada que `thiserror` nos deu.
            e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Ocorreu um erro inesperado.".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mensagens_carregam_os_valores_do_negocio() {
        let err = AppError::InsufficientStock { deficit: 5 };
        assert!(err.to_string().contains('5'));

        let err = AppError::CreditLimitExceeded {
            excess: Decimal::new(10, 0),
        };
        assert!(err.to_string().contains("10"));

        let err = AppError::BelowCostSale { threshold_days: 21 };
        assert!(err.to_string().contains("21"));
    }
}
