//! Narrow interfaces to collaborators outside the trading core

use async_trait::async_trait;
use tracing::warn;

use crate::shared::errors::AppError;
use crate::shared::types::{Address, TokenInfo};

/// Operator-facing message channel
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), AppError>;
}

/// Fire-and-forget delivery: failures are logged, never propagated
pub async fn notify(sink: &dyn NotificationSink, message: &str) {
    if let Err(e) = sink.send(message).await {
        warn!("⚠️ Notification delivery failed: {}", e);
    }
}

/// Token metadata lookup, used for display and sizing
#[async_trait]
pub trait TokenMetadataProvider: Send + Sync {
    async fn info(&self, token: Address) -> Result<TokenInfo, AppError>;
}

/// Token safety screen, consulted once before the first entry
#[async_trait]
pub trait SecurityChecker: Send + Sync {
    async fn is_safe(&self, token: Address) -> Result<bool, AppError>;
}
