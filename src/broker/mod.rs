//! Broker collaborator module
//!
//! Account/position listing and order submission contracts, plus the paper broker

mod paper;
mod types;

pub use paper::{PaperBroker, PaperFill};
pub use types::{
    AccountId, BrokerError, BrokerOrderId, BrokerOrderReport, BrokerOrderStatus, BrokerPosition,
    Direction, InstrumentId, InstrumentKind, PositionSide,
};

use async_trait::async_trait;

/// Trait for account and position listing
#[async_trait]
pub trait BrokerAccounts: Send + Sync {
    /// List all trading accounts
    async fn list_accounts(&self) -> Result<Vec<AccountId>, BrokerError>;
    /// Get open positions for an account
    async fn get_open_positions(&self, account_id: &str) -> Result<Vec<BrokerPosition>, BrokerError>;
}

/// Trait for order submission
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit a market order
    async fn submit_market_order(
        &self,
        account_id: &str,
        instrument_id: &str,
        lots: u64,
        direction: Direction,
    ) -> Result<BrokerOrderId, BrokerError>;
    /// Cancel a live order
    async fn cancel_order(&self, account_id: &str, order_id: &str) -> Result<(), BrokerError>;
    /// Get the broker's view of an order
    async fn get_order_status(
        &self,
        account_id: &str,
        order_id: &str,
    ) -> Result<BrokerOrderReport, BrokerError>;
}
