use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::persistence::StateStore;
use crate::domain::position::Position;
use crate::domain::risk::RiskState;
use crate::shared::errors::AppError;
use crate::shared::types::Address;

/// Volatile store for tests and dry runs without a data directory
#[derive(Default)]
pub struct MemoryStore {
    positions: RwLock<HashMap<Address, Position>>,
    risk: RwLock<Option<RiskState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load_positions(&self) -> Result<Vec<Position>, AppError> {
        let mut positions: Vec<Position> = self.positions.read().await.values().cloned().collect();
        positions.sort_by_key(|p| p.entry_time);
        Ok(positions)
    }

    async fn save_position(&self, position: &Position) -> Result<(), AppError> {
        self.positions.write().await.insert(position.token, position.clone());
        Ok(())
    }

    async fn remove_position(&self, token: Address) -> Result<(), AppError> {
        self.positions.write().await.remove(&token);
        Ok(())
    }

    async fn load_risk_state(&self) -> Result<Option<RiskState>, AppError> {
        Ok(self.risk.read().await.clone())
    }

    async fn save_risk_state(&self, state: &RiskState) -> Result<(), AppError> {
        *self.risk.write().await = Some(state.clone());
        Ok(())
    }
}
