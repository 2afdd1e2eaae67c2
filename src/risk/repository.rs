//! Position risk state repository and risk event log

use super::{PositionRiskState, RiskEvent, RiskEventType, RiskKey, StoreError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Trait for risk state persistence, unique by (account, instrument, side)
#[async_trait]
pub trait RiskStateRepository: Send + Sync {
    /// Find the state for a key
    async fn find(&self, key: &RiskKey) -> Result<Option<PositionRiskState>, StoreError>;
    /// Insert or replace the state for its key
    async fn save(&self, state: &PositionRiskState) -> Result<(), StoreError>;
    /// Delete a state. Returns whether one existed.
    async fn delete(&self, key: &RiskKey) -> Result<bool, StoreError>;
    /// All stored states
    async fn list(&self) -> Result<Vec<PositionRiskState>, StoreError>;
}

/// Trait for the append-only risk event log
#[async_trait]
pub trait RiskEventLog: Send + Sync {
    /// Append events in order
    async fn append(&self, events: &[RiskEvent]) -> Result<(), StoreError>;
}

/// Risk state repository held in memory
#[derive(Default)]
pub struct InMemoryRiskStateRepository {
    states: RwLock<BTreeMap<RiskKey, PositionRiskState>>,
}

impl InMemoryRiskStateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored states
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl RiskStateRepository for InMemoryRiskStateRepository {
    async fn find(&self, key: &RiskKey) -> Result<Option<PositionRiskState>, StoreError> {
        Ok(self.states.read().await.get(key).cloned())
    }

    async fn save(&self, state: &PositionRiskState) -> Result<(), StoreError> {
        self.states.write().await.insert(state.key(), state.clone());
        Ok(())
    }

    async fn delete(&self, key: &RiskKey) -> Result<bool, StoreError> {
        Ok(self.states.write().await.remove(key).is_some())
    }

    async fn list(&self) -> Result<Vec<PositionRiskState>, StoreError> {
        Ok(self.states.read().await.values().cloned().collect())
    }
}

/// Event log held in memory
#[derive(Default)]
pub struct InMemoryEventLog {
    events: RwLock<Vec<RiskEvent>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events in append order
    pub async fn all(&self) -> Vec<RiskEvent> {
        self.events.read().await.clone()
    }

    /// Events for one instrument
    pub async fn for_instrument(&self, instrument_id: &str) -> Vec<RiskEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.instrument_id == instrument_id)
            .cloned()
            .collect()
    }

    /// Number of events of a given type
    pub async fn count(&self, event_type: RiskEventType) -> usize {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl RiskEventLog for InMemoryEventLog {
    async fn append(&self, events: &[RiskEvent]) -> Result<(), StoreError> {
        self.events.write().await.extend_from_slice(events);
        Ok(())
    }
}
