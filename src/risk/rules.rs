//! Per-instrument risk rules

use super::{RiskDefaults, RiskRule, StateSource, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Trait for risk rule storage. Rules are never deleted, only deactivated.
#[async_trait]
pub trait RiskRuleStore: Send + Sync {
    /// Find the rule for an instrument
    async fn find(&self, instrument_id: &str) -> Result<Option<RiskRule>, StoreError>;
    /// Insert or replace a rule
    async fn upsert(&self, rule: RiskRule) -> Result<(), StoreError>;
    /// Return the existing rule, or create one from the defaults. The flag is true when created.
    async fn get_or_create(
        &self,
        instrument_id: &str,
        defaults: &RiskDefaults,
        now: DateTime<Utc>,
    ) -> Result<(RiskRule, bool), StoreError>;
    /// Soft-enable or disable a rule. Returns false if no rule exists.
    async fn set_active(&self, instrument_id: &str, active: bool) -> Result<bool, StoreError>;
}

/// Rule store held in memory
#[derive(Default)]
pub struct InMemoryRiskRuleStore {
    rules: RwLock<HashMap<String, RiskRule>>,
}

impl InMemoryRiskRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RiskRuleStore for InMemoryRiskRuleStore {
    async fn find(&self, instrument_id: &str) -> Result<Option<RiskRule>, StoreError> {
        Ok(self.rules.read().await.get(instrument_id).cloned())
    }

    async fn upsert(&self, rule: RiskRule) -> Result<(), StoreError> {
        self.rules
            .write()
            .await
            .insert(rule.instrument_id.clone(), rule);
        Ok(())
    }

    async fn get_or_create(
        &self,
        instrument_id: &str,
        defaults: &RiskDefaults,
        now: DateTime<Utc>,
    ) -> Result<(RiskRule, bool), StoreError> {
        let mut rules = self.rules.write().await;
        if let Some(rule) = rules.get(instrument_id) {
            return Ok((rule.clone(), false));
        }
        let rule = RiskRule {
            instrument_id: instrument_id.to_string(),
            stop_loss_pct: defaults.stop_loss_pct,
            take_profit_pct: defaults.take_profit_pct,
            active: true,
            updated_at: now,
        };
        rules.insert(instrument_id.to_string(), rule.clone());
        Ok((rule, true))
    }

    async fn set_active(&self, instrument_id: &str, active: bool) -> Result<bool, StoreError> {
        let mut rules = self.rules.write().await;
        match rules.get_mut(instrument_id) {
            Some(rule) => {
                rule.active = active;
                rule.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Parameters for a new state: the rule's SL/TP when active, global defaults otherwise
pub fn resolve_params(rule: Option<&RiskRule>, defaults: &RiskDefaults) -> (RiskDefaults, StateSource) {
    match rule {
        Some(rule) if rule.active => (
            RiskDefaults {
                stop_loss_pct: rule.stop_loss_pct,
                take_profit_pct: rule.take_profit_pct,
                ..*defaults
            },
            StateSource::Rule,
        ),
        _ => (*defaults, StateSource::Defaults),
    }
}
