//! Virtual order monitoring and one-cancels-other coordination

use super::{Claim, ExecutionError, ExitExecutor, ExitOutcome, Order, OrderId, OrderKind, OrderStatus, OrderStore, PanicSwitch};
use crate::broker::{BrokerError, BrokerOrderStatus, OrderGateway, PositionSide};
use crate::market::PriceFeed;
use crate::risk::StoreError;
use crate::telemetry::{increment, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Summary of one monitoring pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcoTickReport {
    pub paused: bool,
    pub monitored: usize,
    pub triggered: usize,
    pub executed: usize,
    pub cancelled_by_oco: usize,
    pub blocked: usize,
    pub failed: usize,
    pub price_failures: usize,
}

/// Tracks virtual protective orders and enforces one fill per OCO group
pub struct OcoCoordinator {
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn OrderGateway>,
    prices: Arc<dyn PriceFeed>,
    exits: Arc<ExitExecutor>,
    panic: Arc<PanicSwitch>,
}

impl OcoCoordinator {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn OrderGateway>,
        prices: Arc<dyn PriceFeed>,
        exits: Arc<ExitExecutor>,
        panic: Arc<PanicSwitch>,
    ) -> Self {
        Self {
            orders,
            gateway,
            prices,
            exits,
            panic,
        }
    }

    /// Place a virtual stop and virtual take sharing a new OCO group
    pub async fn place_bracket(
        &self,
        account_id: &str,
        instrument_id: &str,
        side: PositionSide,
        lots: u64,
        stop_price: Decimal,
        take_price: Decimal,
    ) -> Result<(Order, Order), ExecutionError> {
        let group = Uuid::new_v4().to_string();
        let now = Utc::now();
        let stop = Order::virtual_order(
            OrderKind::VirtualStop,
            account_id,
            instrument_id,
            side,
            lots,
            stop_price,
            Some(group.clone()),
            now,
        );
        let take = Order::virtual_order(
            OrderKind::VirtualTake,
            account_id,
            instrument_id,
            side,
            lots,
            take_price,
            Some(group.clone()),
            now,
        );
        self.orders.insert(stop.clone()).await?;
        self.orders.insert(take.clone()).await?;

        tracing::info!(
            account = account_id,
            instrument = instrument_id,
            group = %group,
            %stop_price,
            %take_price,
            lots,
            "Bracket placed"
        );
        Ok((stop, take))
    }

    /// One pass over every active virtual order
    pub async fn monitor_tick(&self) -> Result<OcoTickReport, StoreError> {
        let mut report = OcoTickReport::default();
        if self.panic.is_engaged() {
            tracing::warn!("Panic stop engaged, skipping virtual order pass");
            report.paused = true;
            return Ok(report);
        }
        let start = Instant::now();

        let active = self.orders.active_virtual().await?;
        report.monitored = active.len();
        set_gauge(GaugeMetric::MonitoredVirtualOrders, active.len() as f64);

        let mut prices: HashMap<String, Option<Decimal>> = HashMap::new();
        for order in active {
            if !prices.contains_key(&order.instrument_id) {
                let price = match self.prices.get_current_price(&order.instrument_id).await {
                    Ok(price) => Some(price),
                    Err(e) => {
                        tracing::warn!(instrument = %order.instrument_id, error = %e, "Price unavailable, skipping");
                        increment(CounterMetric::PriceFetchFailures, 1);
                        report.price_failures += 1;
                        None
                    }
                };
                prices.insert(order.instrument_id.clone(), price);
            }
            let Some(price) = prices.get(&order.instrument_id).copied().flatten() else {
                continue;
            };
            if !order.trigger_hit(price) {
                continue;
            }

            report.triggered += 1;
            match self.execute_virtual(&order, price).await {
                Ok(VirtualOutcome::Executed { cancelled }) => {
                    report.executed += 1;
                    report.cancelled_by_oco += cancelled;
                }
                Ok(VirtualOutcome::CancelledByGroup) => report.cancelled_by_oco += 1,
                Ok(VirtualOutcome::Blocked) => report.blocked += 1,
                Ok(VirtualOutcome::Skipped) => {}
                Err(e) => {
                    tracing::error!(order_id = %order.id, error = %e, "Virtual order execution failed");
                    report.failed += 1;
                }
            }
        }

        record_latency(LatencyMetric::OcoTick, start.elapsed());
        Ok(report)
    }

    async fn execute_virtual(&self, order: &Order, price: Decimal) -> Result<VirtualOutcome, ExecutionError> {
        let now = Utc::now();
        let claimed = match self.orders.claim_execution(order.id, now).await? {
            Claim::Claimed(claimed) => claimed,
            Claim::GroupFilled { by } => {
                let mut cancelled = order.clone();
                cancelled.transition(
                    OrderStatus::CancelledByOco,
                    format!("cancelled by OCO: order {by} already executed"),
                    now,
                );
                self.orders.update(&cancelled).await?;
                increment(CounterMetric::OcoCancellations, 1);
                tracing::info!(order_id = %order.id, executed = %by, "Triggered order cancelled, group already executed");
                return Ok(VirtualOutcome::CancelledByGroup);
            }
            Claim::AlreadyTerminal(status) => {
                tracing::debug!(order_id = %order.id, %status, "Order already terminal");
                return Ok(VirtualOutcome::Skipped);
            }
        };

        let reason = match order.kind {
            OrderKind::VirtualStop => "virtual stop triggered",
            _ => "virtual take triggered",
        };
        tracing::info!(
            order_id = %order.id,
            instrument = %order.instrument_id,
            %price,
            trigger = ?order.trigger_price,
            reason,
            "Virtual order triggered"
        );

        let outcome = self
            .exits
            .submit(
                &order.account_id,
                &order.instrument_id,
                order.direction,
                order.requested_lots,
                reason,
            )
            .await;

        let mut executed = claimed;
        match outcome {
            Ok(ExitOutcome::Submitted(market)) => {
                executed.broker_order_id = market.broker_order_id.clone();
                executed.executed_price = market.executed_price.or(Some(price));
                executed.executed_at = Some(Utc::now());
                executed.transition(
                    OrderStatus::Executed,
                    format!("executed via market order {}", market.id),
                    Utc::now(),
                );
                self.orders.update(&executed).await?;
                let cancelled = match executed.group() {
                    Some(group) => self.cancel_siblings(&group, executed.id).await?,
                    None => 0,
                };
                Ok(VirtualOutcome::Executed { cancelled })
            }
            Ok(ExitOutcome::Blocked { reason }) => {
                executed.transition(OrderStatus::Monitoring, format!("exit blocked: {reason}"), Utc::now());
                self.orders.update(&executed).await?;
                Ok(VirtualOutcome::Blocked)
            }
            Err(e) => {
                executed.transition(OrderStatus::Error, format!("exit failed: {e}"), Utc::now());
                self.orders.update(&executed).await?;
                Err(e)
            }
        }
    }

    /// Cancel every non-terminal member of `group` other than `executed_id`
    pub async fn cancel_siblings(&self, group: &str, executed_id: OrderId) -> Result<usize, ExecutionError> {
        let mut cancelled = 0;
        for sibling in self.orders.group_members(group).await? {
            if sibling.id == executed_id || sibling.status.is_terminal() {
                continue;
            }

            if let Some(broker_order_id) = sibling.broker_order_id.as_deref() {
                match self.gateway.cancel_order(&sibling.account_id, broker_order_id).await {
                    Ok(()) => {}
                    Err(BrokerError::Rejected(reason)) => {
                        // Likely filled at the broker; reconciliation settles it
                        tracing::warn!(
                            order_id = %sibling.id,
                            broker_order_id,
                            reason = %reason,
                            "Sibling cancel rejected"
                        );
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(order_id = %sibling.id, error = %e, "Sibling cancel failed, retrying next pass");
                        continue;
                    }
                }
            }

            let mut updated = sibling.clone();
            updated.transition(
                OrderStatus::CancelledByOco,
                format!("cancelled by OCO: order {executed_id} executed"),
                Utc::now(),
            );
            self.orders.update(&updated).await?;
            increment(CounterMetric::OcoCancellations, 1);
            cancelled += 1;
            tracing::info!(order_id = %sibling.id, executed = %executed_id, group, "Sibling cancelled");
        }
        Ok(cancelled)
    }

    /// Adopt broker-reported terminal status for orders still pending at the broker.
    ///
    /// A live order whose group already has a fill gets its cancel retried. A
    /// market exit the broker rejected or cancelled re-arms the virtual order
    /// that fired it.
    pub async fn reconcile(&self) -> Result<usize, ExecutionError> {
        let mut updated = 0;
        for order in self.orders.pending_broker_orders().await? {
            let Some(broker_order_id) = order.broker_order_id.clone() else {
                continue;
            };
            let report = match self.gateway.get_order_status(&order.account_id, &broker_order_id).await {
                Ok(report) => report,
                Err(e) if e.is_transient() => {
                    tracing::warn!(order_id = %order.id, error = %e, "Status unavailable");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(order_id = %order.id, error = %e, "Status lookup failed");
                    continue;
                }
            };

            let target = match report.status {
                BrokerOrderStatus::Filled => OrderStatus::Filled,
                BrokerOrderStatus::Cancelled => OrderStatus::Cancelled,
                BrokerOrderStatus::Rejected => OrderStatus::Error,
                BrokerOrderStatus::New | BrokerOrderStatus::PartiallyFilled => {
                    if let Some((group, filled_by)) = self.filled_sibling(&order).await? {
                        updated += self.cancel_siblings(&group, filled_by).await?;
                    }
                    continue;
                }
            };

            let mut next = order.clone();
            if target == OrderStatus::Filled {
                next.executed_price = report.executed_price;
                next.executed_at = Some(Utc::now());
            }
            next.transition(target, format!("reconciled from broker status {:?}", report.status), Utc::now());
            self.orders.update(&next).await?;
            updated += 1;

            if target == OrderStatus::Filled {
                if let Some(group) = next.group() {
                    self.cancel_siblings(&group, next.id).await?;
                }
            } else if order.kind == OrderKind::Market {
                updated += self.rearm_executed(&broker_order_id, report.status).await?;
            }
        }
        Ok(updated)
    }

    /// Group and id of a filled member other than `order`
    async fn filled_sibling(&self, order: &Order) -> Result<Option<(String, OrderId)>, ExecutionError> {
        let Some(group) = order.group() else {
            return Ok(None);
        };
        let filled = self
            .orders
            .group_members(&group)
            .await?
            .into_iter()
            .find(|o| o.id != order.id && o.status.is_fill())
            .map(|o| o.id);
        Ok(filled.map(|id| (group, id)))
    }

    /// Put virtual orders back under monitoring after their market exit failed at the broker
    async fn rearm_executed(&self, broker_order_id: &str, status: BrokerOrderStatus) -> Result<usize, ExecutionError> {
        let mut rearmed = 0;
        for mut order in self.orders.executed_via(broker_order_id).await? {
            tracing::warn!(
                order_id = %order.id,
                broker_order_id,
                broker = ?status,
                group = ?order.group(),
                "Exit order not filled at broker, virtual order re-armed; cancelled siblings stay cancelled"
            );
            order.broker_order_id = None;
            order.executed_price = None;
            order.executed_at = None;
            order.transition(
                OrderStatus::Monitoring,
                format!("exit order {broker_order_id} {status:?} at broker, re-armed"),
                Utc::now(),
            );
            self.orders.update(&order).await?;
            rearmed += 1;
        }
        Ok(rearmed)
    }

    /// Drop settled order records older than `before`
    pub async fn prune(&self, before: DateTime<Utc>) -> Result<usize, ExecutionError> {
        let removed = self.orders.prune_settled(before).await?;
        if removed > 0 {
            tracing::debug!(removed, "Settled orders pruned");
        }
        Ok(removed)
    }
}

enum VirtualOutcome {
    Executed { cancelled: usize },
    CancelledByGroup,
    Blocked,
    Skipped,
}
