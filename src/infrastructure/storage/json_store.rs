use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::domain::persistence::StateStore;
use crate::domain::position::Position;
use crate::domain::risk::RiskState;
use crate::shared::errors::AppError;
use crate::shared::types::Address;

const POSITIONS_DIR: &str = "positions";
const RISK_STATE_FILE: &str = "risk_state.json";

/// One JSON document per open position plus the risk counters, under `data_dir`
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Create the directory layout if it does not exist yet
    pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let root = data_dir.into();
        fs::create_dir_all(root.join(POSITIONS_DIR)).await.map_err(|e| {
            AppError::StorageError(format!("Failed to create {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn position_path(&self, token: Address) -> PathBuf {
        self.root.join(POSITIONS_DIR).join(format!("{}.json", token))
    }

    /// Write to a sibling temp file, then rename over the target
    async fn write_atomic<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), AppError> {
        let data = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, AppError> {
        match fs::read(path).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load_positions(&self) -> Result<Vec<Position>, AppError> {
        let mut entries = fs::read_dir(self.root.join(POSITIONS_DIR)).await?;
        let mut positions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            // a corrupt file must not keep the other positions from loading
            match Self::read_json::<Position>(&path).await {
                Ok(Some(position)) => positions.push(position),
                Ok(None) => {}
                Err(e) => warn!("⚠️ Skipping unreadable position file {}: {}", path.display(), e),
            }
        }
        positions.sort_by_key(|p| p.entry_time);
        debug!("💾 Loaded {} positions from {}", positions.len(), self.root.display());
        Ok(positions)
    }

    async fn save_position(&self, position: &Position) -> Result<(), AppError> {
        self.write_atomic(&self.position_path(position.token), position).await
    }

    async fn remove_position(&self, token: Address) -> Result<(), AppError> {
        match fs::remove_file(self.position_path(token)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_risk_state(&self) -> Result<Option<RiskState>, AppError> {
        Self::read_json(&self.root.join(RISK_STATE_FILE)).await
    }

    async fn save_risk_state(&self, state: &RiskState) -> Result<(), AppError> {
        self.write_atomic(&self.root.join(RISK_STATE_FILE), state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::tests::{buy_result, token_info};
    use crate::domain::position::{PositionConfig, Strategy};
    use chrono::Utc;

    fn position() -> Position {
        Position::open(&token_info(), Strategy::Memecoin, &buy_result(), &PositionConfig::default(), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_position_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let saved = position();
        {
            let store = JsonFileStore::open(dir.path()).await.unwrap();
            store.save_position(&saved).await.unwrap();
        }

        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let loaded = store.load_positions().await.unwrap();
        assert_eq!(loaded, vec![saved.clone()]);

        store.remove_position(saved.token).await.unwrap();
        assert!(store.load_positions().await.unwrap().is_empty());
        // removing twice is fine
        store.remove_position(saved.token).await.unwrap();
    }

    #[tokio::test]
    async fn test_risk_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        assert!(store.load_risk_state().await.unwrap().is_none());

        let mut state = RiskState::new(Utc::now());
        state.trades_today = 4;
        state.loss_streak = 2;
        store.save_risk_state(&state).await.unwrap();

        let loaded = store.load_risk_state().await.unwrap().unwrap();
        assert_eq!(loaded.trades_today, 4);
        assert_eq!(loaded.loss_streak, 2);
        assert!(!dir.path().join("risk_state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        store.save_position(&position()).await.unwrap();
        fs::write(dir.path().join(POSITIONS_DIR).join("broken.json"), b"{not json").await.unwrap();

        assert_eq!(store.load_positions().await.unwrap().len(), 1);
    }
}
