//! Risk management module
//!
//! Risk state model, level calculator, rule and state storage, event log and sizing

pub mod calculator;
mod journal;
mod repository;
mod rules;
mod sizing;
mod types;

pub use calculator::{recalculate, Recalculation};
pub use journal::{FanoutEventLog, JsonlJournal};
pub use repository::{InMemoryEventLog, InMemoryRiskStateRepository, RiskEventLog, RiskStateRepository};
pub use rules::{resolve_params, InMemoryRiskRuleStore, RiskRuleStore};
pub use sizing::{CapitalSizingAdvisor, Holding, PortfolioSnapshot, SizingDecision, SizingRequest};
pub use types::{
    PositionRiskState, RiskDefaults, RiskError, RiskEvent, RiskEventType, RiskKey, RiskRule,
    StateSource, StoreError, TrailingType,
};
