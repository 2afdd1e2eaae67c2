//! Exit path: cooldown guard, rate limiter, broker submission, order record

use super::{CooldownDecision, CooldownGuard, ExecutionError, Order, OrderStatus, OrderStore, RateLimiter};
use crate::broker::{BrokerOrderStatus, Direction, OrderGateway};
use crate::settings::SettingsStore;
use crate::telemetry::{increment, record_latency, CounterMetric, LatencyMetric};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

/// Result of an exit attempt that reached a decision
#[derive(Debug, Clone)]
pub enum ExitOutcome {
    /// Market order sent; the record carries the broker id and fill if known
    Submitted(Order),
    /// Refused before reaching the broker
    Blocked { reason: String },
}

impl ExitOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, ExitOutcome::Submitted(_))
    }
}

/// Sends protective market orders
pub struct ExitExecutor {
    gateway: Arc<dyn OrderGateway>,
    orders: Arc<dyn OrderStore>,
    limiter: Arc<RateLimiter>,
    cooldown: CooldownGuard,
    settings: Arc<dyn SettingsStore>,
}

impl ExitExecutor {
    pub fn new(
        gateway: Arc<dyn OrderGateway>,
        orders: Arc<dyn OrderStore>,
        limiter: Arc<RateLimiter>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            cooldown: CooldownGuard::new(Arc::clone(&orders), Arc::clone(&settings)),
            gateway,
            orders,
            limiter,
            settings,
        }
    }

    /// Submit a market order in `direction`
    pub async fn submit(
        &self,
        account_id: &str,
        instrument_id: &str,
        direction: Direction,
        lots: u64,
        reason: &str,
    ) -> Result<ExitOutcome, ExecutionError> {
        let now = Utc::now();
        if let CooldownDecision::Blocked { reason, .. } = self
            .cooldown
            .check(account_id, instrument_id, direction, now)
            .await?
        {
            tracing::warn!(
                account = account_id,
                instrument = instrument_id,
                %direction,
                reason = %reason,
                "Exit blocked"
            );
            increment(CounterMetric::ExitsBlocked, 1);
            return Ok(ExitOutcome::Blocked { reason });
        }

        self.limiter.configure(self.settings.as_ref());
        self.limiter.acquire().await;

        let mut order = Order::market(account_id, instrument_id, direction, lots, reason, now);
        let start = Instant::now();
        let submitted = self
            .gateway
            .submit_market_order(account_id, instrument_id, lots, direction)
            .await;
        record_latency(LatencyMetric::OrderSubmission, start.elapsed());

        let broker_order_id = match submitted {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(
                    account = account_id,
                    instrument = instrument_id,
                    error = %e,
                    "Exit submission failed"
                );
                order.transition(OrderStatus::Error, format!("{reason}: {e}"), Utc::now());
                self.orders.insert(order).await?;
                return Err(e.into());
            }
        };
        increment(CounterMetric::OrdersSubmitted, 1);
        order.broker_order_id = Some(broker_order_id.clone());

        match self
            .gateway
            .get_order_status(account_id, &broker_order_id)
            .await
        {
            Ok(report) if report.status == BrokerOrderStatus::Filled => {
                order.status = OrderStatus::Filled;
                order.executed_price = report.executed_price;
                order.executed_at = Some(Utc::now());
            }
            Ok(report) => {
                tracing::debug!(order_id = %broker_order_id, status = ?report.status, "Exit not filled yet");
            }
            Err(e) => {
                tracing::warn!(order_id = %broker_order_id, error = %e, "Exit status unknown, left for reconciliation");
            }
        }
        order.updated_at = Utc::now();
        self.orders.insert(order.clone()).await?;

        tracing::info!(
            account = account_id,
            instrument = instrument_id,
            %direction,
            lots,
            broker_order_id = %broker_order_id,
            status = %order.status,
            reason,
            "Exit submitted"
        );
        Ok(ExitOutcome::Submitted(order))
    }
}
