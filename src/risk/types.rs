//! Risk state, rules and audit events

use crate::broker::{AccountId, InstrumentId, PositionSide};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// How the trailing stop distance is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrailingType {
    /// Fraction of the watermark
    #[default]
    Percent,
    /// Multiple of the average true range carried on the state
    Atr,
    /// Absolute price distance
    Fixed,
    /// Fraction of the favorable move added to the base stop
    Channel,
}

impl fmt::Display for TrailingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrailingType::Percent => "PERCENT",
            TrailingType::Atr => "ATR",
            TrailingType::Fixed => "FIXED",
            TrailingType::Channel => "CHANNEL",
        };
        write!(f, "{name}")
    }
}

/// Where a state's percentages came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateSource {
    /// Per-instrument risk rule
    Rule,
    /// Global defaults from settings
    Defaults,
    /// Set by an operator
    Manual,
}

/// Unique key of a position risk state
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RiskKey {
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub side: PositionSide,
}

impl RiskKey {
    pub fn new(account_id: &str, instrument_id: &str, side: PositionSide) -> Self {
        Self {
            account_id: account_id.to_string(),
            instrument_id: instrument_id.to_string(),
            side,
        }
    }
}

impl fmt::Display for RiskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.account_id, self.instrument_id, self.side)
    }
}

/// Per-instrument default stop-loss and take-profit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRule {
    pub instrument_id: InstrumentId,
    /// Stop-loss distance as a fraction (0.02 = 2%)
    pub stop_loss_pct: Decimal,
    /// Take-profit distance as a fraction
    pub take_profit_pct: Decimal,
    /// Inactive rules are ignored
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

/// Percentages applied to a new state: global defaults, with SL/TP overridden by an active rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskDefaults {
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    pub trailing_pct: Decimal,
    pub trailing_type: TrailingType,
    pub min_step_ticks: u32,
    pub tick_size: Decimal,
}

/// Risk levels tracked for one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRiskState {
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub side: PositionSide,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    /// Trailing distance; meaning depends on `trailing_type`. Zero disables trailing.
    pub trailing_pct: Decimal,
    pub trailing_type: TrailingType,
    /// Minimum trailing improvement, in ticks
    pub min_step_ticks: u32,
    pub tick_size: Decimal,
    /// Average true range, required by ATR trailing
    pub atr: Option<Decimal>,
    pub stop_loss_level: Option<Decimal>,
    pub take_profit_level: Option<Decimal>,
    /// Highest price seen (LONG)
    pub high_watermark: Option<Decimal>,
    /// Lowest price seen (SHORT)
    pub low_watermark: Option<Decimal>,
    /// Set once the trailing stop has moved the level
    pub trailing_active: bool,
    pub entry_price: Decimal,
    pub average_price_snapshot: Decimal,
    pub quantity_snapshot: u64,
    pub updated_at: DateTime<Utc>,
    pub source: StateSource,
}

impl PositionRiskState {
    /// Create a fresh state for a newly observed position. Levels are filled by the calculator.
    pub fn open(
        key: &RiskKey,
        average_price: Decimal,
        quantity: u64,
        params: &RiskDefaults,
        source: StateSource,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id: key.account_id.clone(),
            instrument_id: key.instrument_id.clone(),
            side: key.side,
            stop_loss_pct: params.stop_loss_pct,
            take_profit_pct: params.take_profit_pct,
            trailing_pct: params.trailing_pct,
            trailing_type: params.trailing_type,
            min_step_ticks: params.min_step_ticks,
            tick_size: params.tick_size,
            atr: None,
            stop_loss_level: None,
            take_profit_level: None,
            high_watermark: None,
            low_watermark: None,
            trailing_active: false,
            entry_price: average_price,
            average_price_snapshot: average_price,
            quantity_snapshot: quantity,
            updated_at: now,
            source,
        }
    }

    pub fn key(&self) -> RiskKey {
        RiskKey::new(&self.account_id, &self.instrument_id, self.side)
    }

    /// The watermark relevant to this side
    pub fn watermark(&self) -> Option<Decimal> {
        match self.side {
            PositionSide::Long => self.high_watermark,
            PositionSide::Short => self.low_watermark,
        }
    }
}

/// Kind of risk audit event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskEventType {
    SlUpdated,
    TpUpdated,
    TrailingUpdated,
    WatermarkUpdated,
    PositionEntered,
    PositionClosed,
    RiskRuleApplied,
}

/// Immutable audit record of a risk state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvent {
    pub id: Uuid,
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub event_type: RiskEventType,
    pub old_value: Option<Decimal>,
    pub new_value: Option<Decimal>,
    pub current_price: Option<Decimal>,
    pub watermark: Option<Decimal>,
    pub reason: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RiskEvent {
    /// Start an event for a position
    pub fn new(
        account_id: &str,
        instrument_id: &str,
        event_type: RiskEventType,
        reason: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: account_id.to_string(),
            instrument_id: instrument_id.to_string(),
            event_type,
            old_value: None,
            new_value: None,
            current_price: None,
            watermark: None,
            reason: reason.into(),
            details: None,
            created_at,
        }
    }

    pub fn with_values(mut self, old_value: Option<Decimal>, new_value: Option<Decimal>) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    pub fn with_price(mut self, current_price: Decimal, watermark: Option<Decimal>) -> Self {
        self.current_price = Some(current_price);
        self.watermark = watermark;
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Storage errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backing store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    /// Write failed
    #[error("Store write failed: {0}")]
    Write(String),
}

/// Risk calculation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    /// Market price is zero or negative
    #[error("Invalid price: {0}")]
    InvalidPrice(Decimal),
    /// Position has no usable average price
    #[error("Missing average price for {0}")]
    MissingAveragePrice(String),
    /// Persistence failed
    #[error(transparent)]
    Store(#[from] StoreError),
}
