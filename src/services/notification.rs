// src/services/notification.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

// Coletor de notificações fire-and-forget: sem contrato de retry.
// O núcleo nunca espera nem depende do resultado; falha é logada e
// descartada pelo chamador.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, title: &str, message: &str, severity: Severity) -> anyhow::Result<()>;
}

// Implementação padrão: só registra no log. A entrega real
// (e-mail, push...) é colaborador externo.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, title: &str, message: &str, severity: Severity) -> anyhow::Result<()> {
        match severity {
            Severity::Info => tracing::info!(%title, "{message}"),
            Severity::Warning => tracing::warn!(%title, "{message}"),
            Severity::Critical => tracing::error!(%title, "{message}"),
        }
        Ok(())
    }
}
