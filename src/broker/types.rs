//! Broker collaborator types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Broker account identifier
pub type AccountId = String;

/// Instrument identifier (FIGI, ticker or exchange symbol)
pub type InstrumentId = String;

/// Broker-assigned order identifier
pub type BrokerOrderId = String;

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// The opposite direction
    pub fn opposite(self) -> Self {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

/// Side of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Direction of an order that reduces a position on this side
    pub fn exit_direction(self) -> Direction {
        match self {
            PositionSide::Long => Direction::Sell,
            PositionSide::Short => Direction::Buy,
        }
    }

    /// Direction of an order that opens or adds to a position on this side
    pub fn entry_direction(self) -> Direction {
        self.exit_direction().opposite()
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

/// Instrument class as reported by the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    #[default]
    Share,
    Bond,
    Etf,
    Future,
    /// Cash balances, never risk-managed
    Currency,
}

/// An open position reported by the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerPosition {
    /// Instrument identifier
    pub instrument_id: InstrumentId,
    /// Instrument class
    #[serde(default)]
    pub kind: InstrumentKind,
    /// Position side
    pub side: PositionSide,
    /// Absolute quantity in lots
    pub quantity: u64,
    /// Average entry price, if the broker reports one
    pub average_price: Option<Decimal>,
}

impl BrokerPosition {
    /// Whether this position is a cash/currency balance
    pub fn is_cash(&self) -> bool {
        self.kind == InstrumentKind::Currency
    }

    /// Whether the position should be risk-managed
    pub fn is_tracked(&self) -> bool {
        !self.is_cash() && self.quantity > 0
    }
}

/// Order status as reported by the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrokerOrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl BrokerOrderStatus {
    /// Whether the broker will not change this status any more
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BrokerOrderStatus::Filled | BrokerOrderStatus::Cancelled | BrokerOrderStatus::Rejected
        )
    }
}

/// Broker order state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerOrderReport {
    /// Current status
    pub status: BrokerOrderStatus,
    /// Average execution price, once filled
    pub executed_price: Option<Decimal>,
    /// Executed quantity in lots
    pub executed_lots: u64,
}

/// Errors returned by market-data and broker collaborators
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// Network or upstream failure, worth retrying on the next tick
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
    /// Request refused by the broker
    #[error("Request rejected: {0}")]
    Rejected(String),
    /// Unknown account, instrument or order
    #[error("Not found: {0}")]
    NotFound(String),
    /// Response was malformed or inconsistent
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl BrokerError {
    /// Whether the failure is transient
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Unavailable(_))
    }
}
