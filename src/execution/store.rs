//! Order record storage

use super::{Order, OrderId, OrderStatus};
use crate::risk::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

/// Result of trying to claim a virtual order for execution
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// The order is now EXECUTED and owned by the caller
    Claimed(Order),
    /// Another member of the OCO group already filled
    GroupFilled { by: OrderId },
    /// The order was already terminal
    AlreadyTerminal(OrderStatus),
}

/// Trait for order record storage
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: Order) -> Result<(), StoreError>;
    /// Replace an existing record
    async fn update(&self, order: &Order) -> Result<(), StoreError>;
    async fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError>;
    /// Non-terminal virtual orders with no live broker order
    async fn active_virtual(&self) -> Result<Vec<Order>, StoreError>;
    /// Every member of an OCO group, by field or legacy message
    async fn group_members(&self, group: &str) -> Result<Vec<Order>, StoreError>;
    /// Orders whose broker order may still change status: a broker id, not
    /// terminal, and not already settled as ERROR
    async fn pending_broker_orders(&self) -> Result<Vec<Order>, StoreError>;
    /// Virtual orders executed through the given broker order
    async fn executed_via(&self, broker_order_id: &str) -> Result<Vec<Order>, StoreError>;
    /// Broker-confirmed fills for an instrument executed at or after `since`.
    /// A virtual order executed through a market order is not counted; the
    /// market order is.
    async fn filled_since(
        &self,
        account_id: &str,
        instrument_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Order>, StoreError>;
    /// Atomically mark a virtual order EXECUTED unless it or its group is already done
    async fn claim_execution(&self, id: OrderId, now: DateTime<Utc>) -> Result<Claim, StoreError>;
    /// Drop terminal records last updated before `before`, keeping any group
    /// that still has a non-terminal member. Returns the number removed.
    async fn prune_settled(&self, before: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Order store held in memory
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<BTreeMap<OrderId, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, ordered by id
    pub async fn all(&self) -> Vec<Order> {
        self.orders.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<(), StoreError> {
        self.orders.write().await.insert(order.id, order);
        Ok(())
    }

    async fn update(&self, order: &Order) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(StoreError::Write(format!("unknown order {}", order.id))),
        }
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn active_virtual(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.kind.is_virtual() && !o.status.is_terminal() && o.broker_order_id.is_none())
            .cloned()
            .collect())
    }

    async fn group_members(&self, group: &str) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.group().as_deref() == Some(group))
            .cloned()
            .collect())
    }

    async fn pending_broker_orders(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| {
                o.broker_order_id.is_some()
                    && !o.status.is_terminal()
                    && o.status != OrderStatus::Error
            })
            .cloned()
            .collect())
    }

    async fn executed_via(&self, broker_order_id: &str) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| {
                o.kind.is_virtual()
                    && o.status == OrderStatus::Executed
                    && o.broker_order_id.as_deref() == Some(broker_order_id)
            })
            .cloned()
            .collect())
    }

    async fn filled_since(
        &self,
        account_id: &str,
        instrument_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Order>, StoreError> {
        let mut fills: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| {
                o.account_id == account_id
                    && o.instrument_id == instrument_id
                    && o.status == OrderStatus::Filled
                    && o.executed_at.is_some_and(|t| t >= since)
            })
            .cloned()
            .collect();
        fills.sort_by_key(|o| o.executed_at);
        Ok(fills)
    }

    async fn claim_execution(&self, id: OrderId, now: DateTime<Utc>) -> Result<Claim, StoreError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get(&id)
            .ok_or_else(|| StoreError::Write(format!("unknown order {id}")))?;
        if order.status.is_terminal() {
            return Ok(Claim::AlreadyTerminal(order.status));
        }

        if let Some(group) = order.group() {
            let filled = orders
                .values()
                .find(|o| o.id != id && o.status.is_fill() && o.group().as_deref() == Some(group.as_str()));
            if let Some(sibling) = filled {
                return Ok(Claim::GroupFilled { by: sibling.id });
            }
        }

        let Some(order) = orders.get_mut(&id) else {
            return Err(StoreError::Write(format!("unknown order {id}")));
        };
        order.transition(OrderStatus::Executed, "submitting exit", now);
        Ok(Claim::Claimed(order.clone()))
    }

    async fn prune_settled(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut orders = self.orders.write().await;
        let open_groups: HashSet<String> = orders
            .values()
            .filter(|o| !o.status.is_terminal())
            .filter_map(Order::group)
            .collect();
        let before_len = orders.len();
        orders.retain(|_, o| {
            !o.status.is_terminal()
                || o.updated_at >= before
                || o.group().is_some_and(|g| open_groups.contains(&g))
        });
        Ok(before_len - orders.len())
    }
}
