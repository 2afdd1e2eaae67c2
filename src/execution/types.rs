//! Execution types

use crate::broker::{AccountId, BrokerError, BrokerOrderId, Direction, InstrumentId, PositionSide};
use crate::risk::calculator::{stop_loss_hit, take_profit_hit};
use crate::risk::StoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Order identifier
pub type OrderId = Uuid;

const OCO_GROUP_TAG: &str = "OCO_GROUP:";

/// What an order record represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    /// Protective stop held locally until triggered
    VirtualStop,
    /// Protective take held locally until triggered
    VirtualTake,
    /// Real market order sent to the broker
    Market,
}

impl OrderKind {
    pub fn is_virtual(&self) -> bool {
        matches!(self, OrderKind::VirtualStop | OrderKind::VirtualTake)
    }
}

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Monitoring,
    Filled,
    Executed,
    Cancelled,
    CancelledByOco,
    /// Submission failed; retried on the next pass
    Error,
}

impl OrderStatus {
    /// Terminal orders are never re-evaluated or re-cancelled
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Executed
                | OrderStatus::Cancelled
                | OrderStatus::CancelledByOco
        )
    }

    /// Whether the order resulted in a fill
    pub fn is_fill(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Executed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStatus::New => "NEW",
            OrderStatus::Monitoring => "MONITORING",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Executed => "EXECUTED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::CancelledByOco => "CANCELLED_BY_OCO",
            OrderStatus::Error => "ERROR",
        };
        write!(f, "{name}")
    }
}

/// An order record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub kind: OrderKind,
    /// Exit direction
    pub direction: Direction,
    pub status: OrderStatus,
    pub requested_lots: u64,
    /// Trigger price for virtual orders
    pub trigger_price: Option<Decimal>,
    pub oco_group: Option<String>,
    pub message: Option<String>,
    pub broker_order_id: Option<BrokerOrderId>,
    pub executed_price: Option<Decimal>,
    pub executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A virtual protective order, monitored locally
    #[allow(clippy::too_many_arguments)]
    pub fn virtual_order(
        kind: OrderKind,
        account_id: &str,
        instrument_id: &str,
        side: PositionSide,
        lots: u64,
        trigger_price: Decimal,
        oco_group: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let message = oco_group.as_ref().map(|g| format!("{OCO_GROUP_TAG}{g}"));
        Self {
            id: Uuid::new_v4(),
            account_id: account_id.to_string(),
            instrument_id: instrument_id.to_string(),
            kind,
            direction: side.exit_direction(),
            status: OrderStatus::Monitoring,
            requested_lots: lots,
            trigger_price: Some(trigger_price),
            oco_group,
            message,
            broker_order_id: None,
            executed_price: None,
            executed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A market order record
    pub fn market(
        account_id: &str,
        instrument_id: &str,
        direction: Direction,
        lots: u64,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: account_id.to_string(),
            instrument_id: instrument_id.to_string(),
            kind: OrderKind::Market,
            direction,
            status: OrderStatus::New,
            requested_lots: lots,
            trigger_price: None,
            oco_group: None,
            message: Some(message.into()),
            broker_order_id: None,
            executed_price: None,
            executed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// OCO group from the field, or parsed from a legacy message
    pub fn group(&self) -> Option<String> {
        self.oco_group.clone().or_else(|| {
            self.message
                .as_deref()
                .and_then(parse_oco_group)
                .map(str::to_string)
        })
    }

    /// Side of the position this order protects
    pub fn position_side(&self) -> PositionSide {
        match self.direction {
            Direction::Sell => PositionSide::Long,
            Direction::Buy => PositionSide::Short,
        }
    }

    /// Whether a virtual order's trigger is breached at `price`
    pub fn trigger_hit(&self, price: Decimal) -> bool {
        let Some(trigger) = self.trigger_price else {
            return false;
        };
        match self.kind {
            OrderKind::VirtualStop => stop_loss_hit(self.position_side(), price, trigger),
            OrderKind::VirtualTake => take_profit_hit(self.position_side(), price, trigger),
            OrderKind::Market => false,
        }
    }

    /// Move to a new status with an audit message.
    /// A group carried only in a legacy message is pinned to `oco_group` first.
    pub fn transition(&mut self, status: OrderStatus, message: impl Into<String>, now: DateTime<Utc>) {
        if self.oco_group.is_none() {
            self.oco_group = self.group();
        }
        self.status = status;
        self.message = Some(message.into());
        self.updated_at = now;
    }
}

/// Extract the group id from a legacy `OCO_GROUP:<id>` message
pub fn parse_oco_group(message: &str) -> Option<&str> {
    let start = message.find(OCO_GROUP_TAG)? + OCO_GROUP_TAG.len();
    let rest = &message[start..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == ';' || c == ',')
        .unwrap_or(rest.len());
    let group = &rest[..end];
    (!group.is_empty()).then_some(group)
}

/// Execution errors
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Order not found: {0}")]
    NotFound(OrderId),
}
