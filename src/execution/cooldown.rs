//! Per-instrument re-trade cooldown

use super::{Order, OrderStore};
use crate::broker::Direction;
use crate::risk::StoreError;
use crate::settings::{keys, SettingsStore};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;

/// How a proposed order relates to the most recent fill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeRelation {
    /// Unwinding the only fill in the lookback window
    FirstTrade,
    /// Same direction as the last fill
    SameDirection,
    /// Opposite direction after earlier activity
    Reversal,
}

impl fmt::Display for TradeRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeRelation::FirstTrade => write!(f, "first trade"),
            TradeRelation::SameDirection => write!(f, "same direction"),
            TradeRelation::Reversal => write!(f, "reversal"),
        }
    }
}

/// Required waiting times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownPolicy {
    pub lookback: Duration,
    pub first_trade: Duration,
    pub same_direction: Duration,
    pub reversal: Duration,
}

impl CooldownPolicy {
    /// Read the policy from live settings
    pub fn from_settings(settings: &dyn SettingsStore) -> Self {
        let defaults = crate::config::CooldownConfig::default();
        let minutes = |key, default: i64| Duration::minutes(settings.get_int(key, default).max(0));
        Self {
            lookback: minutes(keys::COOLDOWN_LOOKBACK_MINUTES, defaults.lookback_minutes),
            first_trade: minutes(keys::COOLDOWN_FIRST_TRADE_MINUTES, defaults.first_trade_minutes),
            same_direction: minutes(
                keys::COOLDOWN_SAME_DIRECTION_MINUTES,
                defaults.same_direction_minutes,
            ),
            reversal: minutes(keys::COOLDOWN_REVERSAL_MINUTES, defaults.reversal_minutes),
        }
    }

    pub fn required(&self, relation: TradeRelation) -> Duration {
        match relation {
            TradeRelation::FirstTrade => self.first_trade,
            TradeRelation::SameDirection => self.same_direction,
            TradeRelation::Reversal => self.reversal,
        }
    }
}

/// Cooldown check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CooldownDecision {
    Allowed,
    Blocked { reason: String, remaining: Duration },
}

impl CooldownDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, CooldownDecision::Allowed)
    }
}

/// Decide from the fills in the lookback window, oldest first
pub fn evaluate(
    policy: &CooldownPolicy,
    fills: &[Order],
    direction: Direction,
    now: DateTime<Utc>,
) -> CooldownDecision {
    let Some(last) = fills.last() else {
        return CooldownDecision::Allowed;
    };
    let Some(last_at) = last.executed_at else {
        return CooldownDecision::Allowed;
    };

    let relation = if last.direction == direction {
        TradeRelation::SameDirection
    } else if fills.len() == 1 {
        TradeRelation::FirstTrade
    } else {
        TradeRelation::Reversal
    };
    let required = policy.required(relation);
    let elapsed = now - last_at;
    if elapsed >= required {
        return CooldownDecision::Allowed;
    }

    let remaining = required - elapsed;
    CooldownDecision::Blocked {
        reason: format!(
            "cooldown active for {} ({}): last {} fill {} min ago, {} min required, {} min remaining",
            last.instrument_id,
            relation,
            last.direction,
            elapsed.num_minutes(),
            required.num_minutes(),
            (remaining.num_seconds() + 59) / 60
        ),
        remaining,
    }
}

/// Checks recent fills before an order is sent
pub struct CooldownGuard {
    orders: Arc<dyn OrderStore>,
    settings: Arc<dyn SettingsStore>,
}

impl CooldownGuard {
    pub fn new(orders: Arc<dyn OrderStore>, settings: Arc<dyn SettingsStore>) -> Self {
        Self { orders, settings }
    }

    pub async fn check(
        &self,
        account_id: &str,
        instrument_id: &str,
        direction: Direction,
        now: DateTime<Utc>,
    ) -> Result<CooldownDecision, StoreError> {
        let policy = CooldownPolicy::from_settings(self.settings.as_ref());
        let fills = self
            .orders
            .filled_since(account_id, instrument_id, now - policy.lookback)
            .await?;
        Ok(evaluate(&policy, &fills, direction, now))
    }
}
