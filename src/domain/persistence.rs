//! Durable state port for open positions and risk counters

use async_trait::async_trait;

use crate::domain::position::Position;
use crate::domain::risk::RiskState;
use crate::shared::errors::AppError;
use crate::shared::types::Address;

/// Key-value style store keyed by token address
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_positions(&self) -> Result<Vec<Position>, AppError>;

    async fn save_position(&self, position: &Position) -> Result<(), AppError>;

    async fn remove_position(&self, token: Address) -> Result<(), AppError>;

    async fn load_risk_state(&self) -> Result<Option<RiskState>, AppError>;

    async fn save_risk_state(&self, state: &RiskState) -> Result<(), AppError>;
}
