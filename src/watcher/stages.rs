//! Take-profit stage flags, keyed by (account, instrument)

use crate::risk::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Key-value store for the two-stage take-profit flag
#[async_trait]
pub trait StageStore: Send + Sync {
    /// Current stage, 0 when unset
    async fn get(&self, account_id: &str, instrument_id: &str) -> Result<u8, StoreError>;
    async fn set(&self, account_id: &str, instrument_id: &str, stage: u8) -> Result<(), StoreError>;
    async fn clear(&self, account_id: &str, instrument_id: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct InMemoryStageStore {
    stages: RwLock<HashMap<(String, String), u8>>,
}

impl InMemoryStageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StageStore for InMemoryStageStore {
    async fn get(&self, account_id: &str, instrument_id: &str) -> Result<u8, StoreError> {
        let stages = self.stages.read().await;
        Ok(stages
            .get(&(account_id.to_string(), instrument_id.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn set(&self, account_id: &str, instrument_id: &str, stage: u8) -> Result<(), StoreError> {
        self.stages
            .write()
            .await
            .insert((account_id.to_string(), instrument_id.to_string()), stage);
        Ok(())
    }

    async fn clear(&self, account_id: &str, instrument_id: &str) -> Result<(), StoreError> {
        self.stages
            .write()
            .await
            .remove(&(account_id.to_string(), instrument_id.to_string()));
        Ok(())
    }
}
