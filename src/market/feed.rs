//! In-memory price feed

use super::PriceFeed;
use crate::broker::BrokerError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Price feed holding the last price set for each instrument
#[derive(Default)]
pub struct StaticPriceFeed {
    prices: Arc<RwLock<HashMap<String, Decimal>>>,
}

impl StaticPriceFeed {
    /// Create an empty feed
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a feed seeded with prices
    pub fn with_prices(prices: HashMap<String, Decimal>) -> Self {
        Self {
            prices: Arc::new(RwLock::new(prices)),
        }
    }

    /// Set the current price of an instrument
    pub async fn set_price(&self, instrument_id: &str, price: Decimal) {
        let mut prices = self.prices.write().await;
        prices.insert(instrument_id.to_string(), price);
    }

    /// Remove an instrument, making lookups fail
    pub async fn clear_price(&self, instrument_id: &str) {
        let mut prices = self.prices.write().await;
        prices.remove(instrument_id);
    }
}

#[async_trait]
impl PriceFeed for StaticPriceFeed {
    async fn get_current_price(&self, instrument_id: &str) -> Result<Decimal, BrokerError> {
        let prices = self.prices.read().await;
        prices
            .get(instrument_id)
            .copied()
            .ok_or_else(|| BrokerError::Unavailable(format!("no price for {instrument_id}")))
    }
}
