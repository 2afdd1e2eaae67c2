//! Paper broker with simulated fills

use super::{
    AccountId, BrokerAccounts, BrokerError, BrokerOrderId, BrokerOrderReport, BrokerOrderStatus,
    BrokerPosition, Direction, InstrumentKind, OrderGateway, PositionSide,
};
use crate::market::PriceFeed;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A simulated execution
#[derive(Debug, Clone)]
pub struct PaperFill {
    pub order_id: BrokerOrderId,
    pub account_id: AccountId,
    pub instrument_id: String,
    pub direction: Direction,
    pub lots: u64,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct RestingOrder {
    account_id: AccountId,
    instrument_id: String,
    direction: Direction,
    lots: u64,
}

#[derive(Default)]
struct PaperState {
    positions: BTreeMap<AccountId, Vec<BrokerPosition>>,
    orders: HashMap<BrokerOrderId, BrokerOrderReport>,
    resting: HashMap<BrokerOrderId, RestingOrder>,
    fills: Vec<PaperFill>,
}

/// Paper broker: market orders fill immediately at the feed price
pub struct PaperBroker {
    prices: Arc<dyn PriceFeed>,
    state: Arc<RwLock<PaperState>>,
}

impl PaperBroker {
    /// Create a new paper broker backed by a price feed
    pub fn new(prices: Arc<dyn PriceFeed>) -> Self {
        Self {
            prices,
            state: Arc::new(RwLock::new(PaperState::default())),
        }
    }

    /// Register an account with no positions
    pub async fn add_account(&self, account_id: &str) {
        let mut state = self.state.write().await;
        state.positions.entry(account_id.to_string()).or_default();
    }

    /// Insert or replace a position
    pub async fn set_position(&self, account_id: &str, position: BrokerPosition) {
        let mut state = self.state.write().await;
        let positions = state.positions.entry(account_id.to_string()).or_default();
        positions.retain(|p| p.instrument_id != position.instrument_id);
        positions.push(position);
    }

    /// Remove a position entirely
    pub async fn remove_position(&self, account_id: &str, instrument_id: &str) {
        let mut state = self.state.write().await;
        if let Some(positions) = state.positions.get_mut(account_id) {
            positions.retain(|p| p.instrument_id != instrument_id);
        }
    }

    /// Place a resting order that stays live until filled or cancelled
    pub async fn place_resting_order(
        &self,
        account_id: &str,
        instrument_id: &str,
        lots: u64,
        direction: Direction,
    ) -> BrokerOrderId {
        let order_id = Uuid::new_v4().to_string();
        let mut state = self.state.write().await;
        state.orders.insert(
            order_id.clone(),
            BrokerOrderReport {
                status: BrokerOrderStatus::New,
                executed_price: None,
                executed_lots: 0,
            },
        );
        state.resting.insert(
            order_id.clone(),
            RestingOrder {
                account_id: account_id.to_string(),
                instrument_id: instrument_id.to_string(),
                direction,
                lots,
            },
        );
        order_id
    }

    /// Fill a resting order at the given price
    pub async fn fill_resting_order(&self, order_id: &str, price: Decimal) -> Result<(), BrokerError> {
        let mut state = self.state.write().await;
        let resting = state
            .resting
            .remove(order_id)
            .ok_or_else(|| BrokerError::NotFound(order_id.to_string()))?;
        Self::apply_fill(&mut state, order_id, &resting, price);
        Ok(())
    }

    /// All simulated fills so far
    pub async fn fills(&self) -> Vec<PaperFill> {
        self.state.read().await.fills.clone()
    }

    fn apply_fill(state: &mut PaperState, order_id: &str, order: &RestingOrder, price: Decimal) {
        let positions = state.positions.entry(order.account_id.clone()).or_default();
        match positions
            .iter_mut()
            .position(|p| p.instrument_id == order.instrument_id)
        {
            Some(idx) => {
                let position = &mut positions[idx];
                if order.direction == position.side.exit_direction() {
                    position.quantity = position.quantity.saturating_sub(order.lots);
                    if position.quantity == 0 {
                        positions.remove(idx);
                    }
                } else {
                    let old_value =
                        position.average_price.unwrap_or(price) * Decimal::from(position.quantity);
                    let new_quantity = position.quantity + order.lots;
                    let added_value = price * Decimal::from(order.lots);
                    position.average_price =
                        Some((old_value + added_value) / Decimal::from(new_quantity));
                    position.quantity = new_quantity;
                }
            }
            None => {
                let side = match order.direction {
                    Direction::Buy => PositionSide::Long,
                    Direction::Sell => PositionSide::Short,
                };
                positions.push(BrokerPosition {
                    instrument_id: order.instrument_id.clone(),
                    kind: InstrumentKind::Share,
                    side,
                    quantity: order.lots,
                    average_price: Some(price),
                });
            }
        }

        state.orders.insert(
            order_id.to_string(),
            BrokerOrderReport {
                status: BrokerOrderStatus::Filled,
                executed_price: Some(price),
                executed_lots: order.lots,
            },
        );
        state.fills.push(PaperFill {
            order_id: order_id.to_string(),
            account_id: order.account_id.clone(),
            instrument_id: order.instrument_id.clone(),
            direction: order.direction,
            lots: order.lots,
            price,
            timestamp: Utc::now(),
        });
    }
}

#[async_trait]
impl BrokerAccounts for PaperBroker {
    async fn list_accounts(&self) -> Result<Vec<AccountId>, BrokerError> {
        let state = self.state.read().await;
        Ok(state.positions.keys().cloned().collect())
    }

    async fn get_open_positions(&self, account_id: &str) -> Result<Vec<BrokerPosition>, BrokerError> {
        let state = self.state.read().await;
        state
            .positions
            .get(account_id)
            .cloned()
            .ok_or_else(|| BrokerError::NotFound(format!("account {account_id}")))
    }
}

#[async_trait]
impl OrderGateway for PaperBroker {
    async fn submit_market_order(
        &self,
        account_id: &str,
        instrument_id: &str,
        lots: u64,
        direction: Direction,
    ) -> Result<BrokerOrderId, BrokerError> {
        if lots == 0 {
            return Err(BrokerError::Rejected("zero lots".to_string()));
        }
        let price = self.prices.get_current_price(instrument_id).await?;
        let order_id = Uuid::new_v4().to_string();
        let order = RestingOrder {
            account_id: account_id.to_string(),
            instrument_id: instrument_id.to_string(),
            direction,
            lots,
        };

        let mut state = self.state.write().await;
        Self::apply_fill(&mut state, &order_id, &order, price);

        tracing::info!(
            order_id = %order_id,
            account = account_id,
            instrument = instrument_id,
            %direction,
            lots,
            %price,
            "Paper order filled"
        );
        Ok(order_id)
    }

    async fn cancel_order(&self, account_id: &str, order_id: &str) -> Result<(), BrokerError> {
        let mut state = self.state.write().await;
        let report = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| BrokerError::NotFound(order_id.to_string()))?;
        if report.status == BrokerOrderStatus::Filled {
            return Err(BrokerError::Rejected(format!(
                "order {order_id} already filled"
            )));
        }
        report.status = BrokerOrderStatus::Cancelled;
        state.resting.remove(order_id);
        tracing::info!(order_id, account = account_id, "Paper order cancelled");
        Ok(())
    }

    async fn get_order_status(
        &self,
        _account_id: &str,
        order_id: &str,
    ) -> Result<BrokerOrderReport, BrokerError> {
        let state = self.state.read().await;
        state
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| BrokerError::NotFound(order_id.to_string()))
    }
}
