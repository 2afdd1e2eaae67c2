//! Monitoring loops over open positions
//!
//! The position watcher refreshes risk state and evaluates triggers, the sweep
//! re-checks stored levels, and the sync task retires states for closed positions.

mod position_watcher;
mod stages;
mod sweep;
mod sync;
mod triggers;

pub use position_watcher::{PositionWatcher, WatcherReport};
pub use stages::{InMemoryStageStore, StageStore};
pub use sweep::{SlTpSweep, SweepReport};
pub use sync::{PositionSync, SyncReport};
pub use triggers::TriggerOutcome;

use crate::broker::{BrokerAccounts, BrokerError};
use crate::execution::{ExitExecutor, PanicSwitch};
use crate::market::PriceFeed;
use crate::risk::{
    CapitalSizingAdvisor, RiskEvent, RiskEventLog, RiskRuleStore, RiskStateRepository, StoreError,
};
use crate::settings::SettingsStore;
use crate::telemetry::{increment, CounterMetric};
use std::sync::Arc;
use thiserror::Error;

/// Collaborators shared by the monitoring loops
#[derive(Clone)]
pub struct RiskContext {
    pub accounts: Arc<dyn BrokerAccounts>,
    pub prices: Arc<dyn PriceFeed>,
    pub rules: Arc<dyn RiskRuleStore>,
    pub states: Arc<dyn RiskStateRepository>,
    pub events: Arc<dyn RiskEventLog>,
    pub stages: Arc<dyn StageStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub exits: Arc<ExitExecutor>,
    pub panic: Arc<PanicSwitch>,
    /// Sizes partial take-profit legs
    pub sizing: Arc<CapitalSizingAdvisor>,
}

impl RiskContext {
    /// Append events, logging rather than failing the pass
    pub(crate) async fn record_events(&self, events: &[RiskEvent]) {
        if events.is_empty() {
            return;
        }
        match self.events.append(events).await {
            Ok(()) => increment(CounterMetric::RiskEvents, events.len() as u64),
            Err(e) => tracing::error!(error = %e, count = events.len(), "Failed to record risk events"),
        }
    }
}

/// Errors that abort a whole monitoring pass
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
