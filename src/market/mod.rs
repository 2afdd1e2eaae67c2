//! Market data module
//!
//! Current price lookup for instruments under risk control

mod feed;

pub use feed::StaticPriceFeed;

use crate::broker::BrokerError;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Trait for current price providers
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Get the last traded price of an instrument
    async fn get_current_price(&self, instrument_id: &str) -> Result<Decimal, BrokerError>;
}
