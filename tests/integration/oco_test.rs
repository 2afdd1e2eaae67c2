//! OCO coordination, reconciliation and cooldown integration tests

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use position_guard::broker::{
    BrokerAccounts, BrokerError, BrokerOrderId, BrokerOrderReport, BrokerOrderStatus, BrokerPosition,
    Direction, InstrumentKind, OrderGateway, PaperBroker, PositionSide,
};
use position_guard::execution::{
    CooldownDecision, CooldownGuard, ExitExecutor, InMemoryOrderStore, OcoCoordinator, Order,
    OrderKind, OrderStatus, OrderStore, PanicSwitch, RateLimiter,
};
use position_guard::market::StaticPriceFeed;
use position_guard::settings::{keys, InMemorySettings, SettingsStore};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Paper broker with scriptable cancel failures and market orders held at the broker
struct ScriptedGateway {
    inner: Arc<PaperBroker>,
    failing_cancels: AtomicU32,
    hold_market_orders: AtomicBool,
    held: Mutex<HashMap<String, BrokerOrderStatus>>,
}

impl ScriptedGateway {
    fn new(inner: Arc<PaperBroker>) -> Self {
        Self {
            inner,
            failing_cancels: AtomicU32::new(0),
            hold_market_orders: AtomicBool::new(false),
            held: Mutex::new(HashMap::new()),
        }
    }

    async fn set_held_status(&self, order_id: &str, status: BrokerOrderStatus) {
        self.held.lock().await.insert(order_id.to_string(), status);
    }
}

#[async_trait]
impl OrderGateway for ScriptedGateway {
    async fn submit_market_order(
        &self,
        account_id: &str,
        instrument_id: &str,
        lots: u64,
        direction: Direction,
    ) -> Result<BrokerOrderId, BrokerError> {
        if self.hold_market_orders.load(Ordering::SeqCst) {
            let id = format!("held-{}", Uuid::new_v4());
            self.held.lock().await.insert(id.clone(), BrokerOrderStatus::New);
            return Ok(id);
        }
        self.inner
            .submit_market_order(account_id, instrument_id, lots, direction)
            .await
    }

    async fn cancel_order(&self, account_id: &str, order_id: &str) -> Result<(), BrokerError> {
        let fail = self
            .failing_cancels
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(BrokerError::Unavailable("cancel timed out".to_string()));
        }
        self.inner.cancel_order(account_id, order_id).await
    }

    async fn get_order_status(
        &self,
        account_id: &str,
        order_id: &str,
    ) -> Result<BrokerOrderReport, BrokerError> {
        if let Some(status) = self.held.lock().await.get(order_id).copied() {
            return Ok(BrokerOrderReport {
                status,
                executed_price: None,
                executed_lots: 0,
            });
        }
        self.inner.get_order_status(account_id, order_id).await
    }
}

struct Desk {
    feed: Arc<StaticPriceFeed>,
    broker: Arc<PaperBroker>,
    orders: Arc<InMemoryOrderStore>,
    settings: Arc<InMemorySettings>,
    coordinator: OcoCoordinator,
}

async fn paper() -> (Arc<StaticPriceFeed>, Arc<PaperBroker>) {
    let feed = Arc::new(StaticPriceFeed::new());
    feed.set_price("SBER", dec!(100)).await;
    let broker = Arc::new(PaperBroker::new(feed.clone()));
    broker
        .set_position(
            "acc-1",
            BrokerPosition {
                instrument_id: "SBER".to_string(),
                kind: InstrumentKind::Share,
                side: PositionSide::Long,
                quantity: 10,
                average_price: Some(dec!(100)),
            },
        )
        .await;
    (feed, broker)
}

/// Orders flow through `gateway`; `broker` is the paper book behind it
async fn desk_on(
    feed: Arc<StaticPriceFeed>,
    broker: Arc<PaperBroker>,
    gateway: Arc<dyn OrderGateway>,
) -> Desk {
    let orders = Arc::new(InMemoryOrderStore::new());
    let settings = Arc::new(InMemorySettings::new());
    let exits = Arc::new(ExitExecutor::new(
        gateway.clone(),
        orders.clone(),
        Arc::new(RateLimiter::new(600, Duration::from_millis(10))),
        settings.clone(),
    ));
    let coordinator = OcoCoordinator::new(
        orders.clone(),
        gateway,
        feed.clone(),
        exits,
        Arc::new(PanicSwitch::default()),
    );
    Desk {
        feed,
        broker,
        orders,
        settings,
        coordinator,
    }
}

async fn desk() -> Desk {
    let (feed, broker) = paper().await;
    desk_on(feed, broker.clone(), broker).await
}

async fn scripted_desk() -> (Desk, Arc<ScriptedGateway>) {
    let (feed, broker) = paper().await;
    let gateway = Arc::new(ScriptedGateway::new(broker.clone()));
    let d = desk_on(feed, broker, gateway.clone()).await;
    (d, gateway)
}

/// A take order that also rests at the broker, paired with a local virtual stop
async fn live_take_bracket(d: &Desk) -> (Order, Order, String) {
    let now = Utc::now();
    let group = "grp-live".to_string();
    let stop = Order::virtual_order(
        OrderKind::VirtualStop,
        "acc-1",
        "SBER",
        PositionSide::Long,
        10,
        dec!(95),
        Some(group.clone()),
        now,
    );
    let mut take = Order::virtual_order(
        OrderKind::VirtualTake,
        "acc-1",
        "SBER",
        PositionSide::Long,
        10,
        dec!(110),
        Some(group),
        now,
    );
    let broker_id = d
        .broker
        .place_resting_order("acc-1", "SBER", 10, Direction::Sell)
        .await;
    take.broker_order_id = Some(broker_id.clone());
    d.orders.insert(stop.clone()).await.unwrap();
    d.orders.insert(take.clone()).await.unwrap();
    (stop, take, broker_id)
}

#[tokio::test]
async fn test_only_one_leg_executes() {
    let d = desk().await;
    let (stop, take) = d
        .coordinator
        .place_bracket("acc-1", "SBER", PositionSide::Long, 10, dec!(95), dec!(110))
        .await
        .unwrap();

    d.feed.set_price("SBER", dec!(111)).await;
    let report = d.coordinator.monitor_tick().await.unwrap();
    assert_eq!(report.executed, 1);
    assert_eq!(report.cancelled_by_oco, 1);

    // A later crash through the stop must not produce a second exit
    d.feed.set_price("SBER", dec!(90)).await;
    let report = d.coordinator.monitor_tick().await.unwrap();
    assert_eq!(report.monitored, 0);

    let take = d.orders.get(take.id).await.unwrap().unwrap();
    let stop = d.orders.get(stop.id).await.unwrap().unwrap();
    assert_eq!(take.status, OrderStatus::Executed);
    assert_eq!(stop.status, OrderStatus::CancelledByOco);
    assert!(stop
        .message
        .as_deref()
        .is_some_and(|m| m.contains(&take.id.to_string())));
    assert_eq!(d.broker.fills().await.len(), 1);
}

#[tokio::test]
async fn test_reconcile_first_keeps_group_exclusive() {
    let d = desk().await;
    let (stop, take, broker_id) = live_take_bracket(&d).await;
    d.broker.fill_resting_order(&broker_id, dec!(110)).await.unwrap();

    let updated = d.coordinator.reconcile().await.unwrap();
    assert_eq!(updated, 1);
    let take = d.orders.get(take.id).await.unwrap().unwrap();
    assert_eq!(take.status, OrderStatus::Filled);
    assert_eq!(take.executed_price, Some(dec!(110)));
    assert_eq!(
        d.orders.get(stop.id).await.unwrap().unwrap().status,
        OrderStatus::CancelledByOco
    );

    d.feed.set_price("SBER", dec!(94)).await;
    let report = d.coordinator.monitor_tick().await.unwrap();
    assert_eq!(report.triggered, 0);
    assert_eq!(d.broker.fills().await.len(), 1);
}

#[tokio::test]
async fn test_broker_fill_racing_virtual_trigger() {
    let d = desk().await;
    let (stop, take, broker_id) = live_take_bracket(&d).await;

    // Take fills at the broker before reconciliation sees it
    d.broker.fill_resting_order(&broker_id, dec!(110)).await.unwrap();
    d.feed.set_price("SBER", dec!(94)).await;

    let report = d.coordinator.monitor_tick().await.unwrap();
    assert_eq!(report.executed, 1);
    // Cancel of the live take is rejected, so it is left for reconciliation
    assert_eq!(report.cancelled_by_oco, 0);
    assert_eq!(
        d.orders.get(take.id).await.unwrap().unwrap().status,
        OrderStatus::Monitoring
    );

    let updated = d.coordinator.reconcile().await.unwrap();
    assert_eq!(updated, 1);
    assert_eq!(
        d.orders.get(take.id).await.unwrap().unwrap().status,
        OrderStatus::Filled
    );
    assert_eq!(
        d.orders.get(stop.id).await.unwrap().unwrap().status,
        OrderStatus::Executed
    );

    let report = d.broker.get_order_status("acc-1", &broker_id).await.unwrap();
    assert_eq!(report.executed_lots, 10);
}

#[tokio::test]
async fn test_legacy_message_grouping() {
    let d = desk().await;
    let now = Utc::now();
    let mut stop = Order::virtual_order(
        OrderKind::VirtualStop,
        "acc-1",
        "SBER",
        PositionSide::Long,
        10,
        dec!(95),
        None,
        now,
    );
    stop.message = Some("placed by terminal OCO_GROUP:legacy-7".to_string());
    let mut take = Order::virtual_order(
        OrderKind::VirtualTake,
        "acc-1",
        "SBER",
        PositionSide::Long,
        10,
        dec!(110),
        None,
        now,
    );
    take.message = Some("OCO_GROUP:legacy-7".to_string());
    d.orders.insert(stop.clone()).await.unwrap();
    d.orders.insert(take.clone()).await.unwrap();

    d.feed.set_price("SBER", dec!(95)).await;
    let report = d.coordinator.monitor_tick().await.unwrap();
    assert_eq!(report.executed, 1);
    assert_eq!(report.cancelled_by_oco, 1);
    assert_eq!(
        d.orders.get(take.id).await.unwrap().unwrap().status,
        OrderStatus::CancelledByOco
    );
    let positions = d.broker.get_open_positions("acc-1").await.unwrap();
    assert!(positions.is_empty());
}

#[tokio::test]
async fn test_trigger_blocked_by_cooldown_stays_monitoring() {
    let d = desk().await;
    d.settings
        .set(keys::COOLDOWN_SAME_DIRECTION_MINUTES, "30".to_string());
    let mut prior = Order::market("acc-1", "SBER", Direction::Sell, 2, "manual trim", Utc::now());
    prior.transition(OrderStatus::Filled, "filled", Utc::now());
    prior.executed_at = Some(Utc::now() - ChronoDuration::minutes(5));
    d.orders.insert(prior).await.unwrap();

    let (stop, _) = d
        .coordinator
        .place_bracket("acc-1", "SBER", PositionSide::Long, 10, dec!(95), dec!(110))
        .await
        .unwrap();
    d.feed.set_price("SBER", dec!(94)).await;

    let report = d.coordinator.monitor_tick().await.unwrap();
    assert_eq!(report.blocked, 1);
    assert_eq!(
        d.orders.get(stop.id).await.unwrap().unwrap().status,
        OrderStatus::Monitoring
    );
    assert!(d.broker.fills().await.is_empty());
}

async fn guard_after_fill(minutes_ago: i64) -> CooldownDecision {
    let orders = Arc::new(InMemoryOrderStore::new());
    let settings = Arc::new(InMemorySettings::new());
    settings.set(keys::COOLDOWN_SAME_DIRECTION_MINUTES, "30".to_string());

    let now = Utc::now();
    let mut fill = Order::market("acc-1", "SBER", Direction::Sell, 1, "exit", now);
    fill.transition(OrderStatus::Filled, "filled", now);
    fill.executed_at = Some(now - ChronoDuration::minutes(minutes_ago));
    orders.insert(fill).await.unwrap();

    let guard = CooldownGuard::new(orders, settings);
    guard
        .check("acc-1", "SBER", Direction::Sell, now)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_same_direction_cooldown_window() {
    match guard_after_fill(10).await {
        CooldownDecision::Blocked { reason, remaining } => {
            assert!(reason.contains("20 min remaining"), "{reason}");
            assert_eq!(remaining, ChronoDuration::minutes(20));
        }
        CooldownDecision::Allowed => panic!("expected cooldown block"),
    }
    assert!(guard_after_fill(31).await.is_allowed());
}

#[tokio::test]
async fn test_failed_sibling_cancel_retried_by_reconcile() {
    let (d, gateway) = scripted_desk().await;
    let (stop, take, broker_id) = live_take_bracket(&d).await;
    gateway.failing_cancels.store(1, Ordering::SeqCst);

    d.feed.set_price("SBER", dec!(94)).await;
    let report = d.coordinator.monitor_tick().await.unwrap();
    assert_eq!(report.executed, 1);
    assert_eq!(report.cancelled_by_oco, 0);
    assert_eq!(
        d.orders.get(take.id).await.unwrap().unwrap().status,
        OrderStatus::Monitoring
    );

    let updated = d.coordinator.reconcile().await.unwrap();
    assert_eq!(updated, 1);
    let take = d.orders.get(take.id).await.unwrap().unwrap();
    assert_eq!(take.status, OrderStatus::CancelledByOco);
    assert!(take
        .message
        .as_deref()
        .is_some_and(|m| m.contains(&stop.id.to_string())));
    let report = d.broker.get_order_status("acc-1", &broker_id).await.unwrap();
    assert_eq!(report.status, BrokerOrderStatus::Cancelled);

    // Nothing left pending at the broker
    assert_eq!(d.coordinator.reconcile().await.unwrap(), 0);
    assert_eq!(d.broker.fills().await.len(), 1);
}

#[tokio::test]
async fn test_rejected_exit_rearms_virtual_order() {
    let (d, gateway) = scripted_desk().await;
    gateway.hold_market_orders.store(true, Ordering::SeqCst);
    let (stop, take) = d
        .coordinator
        .place_bracket("acc-1", "SBER", PositionSide::Long, 10, dec!(95), dec!(110))
        .await
        .unwrap();

    d.feed.set_price("SBER", dec!(94)).await;
    let report = d.coordinator.monitor_tick().await.unwrap();
    assert_eq!(report.executed, 1);
    let executed = d.orders.get(stop.id).await.unwrap().unwrap();
    assert_eq!(executed.status, OrderStatus::Executed);
    assert_eq!(
        d.orders.get(take.id).await.unwrap().unwrap().status,
        OrderStatus::CancelledByOco
    );
    let held_id = executed.broker_order_id.clone().unwrap();

    // Still working at the broker: nothing changes
    assert_eq!(d.coordinator.reconcile().await.unwrap(), 0);

    gateway.set_held_status(&held_id, BrokerOrderStatus::Rejected).await;
    let updated = d.coordinator.reconcile().await.unwrap();
    assert_eq!(updated, 2);

    let market = d
        .orders
        .all()
        .await
        .into_iter()
        .find(|o| o.kind == OrderKind::Market)
        .unwrap();
    assert_eq!(market.status, OrderStatus::Error);
    let rearmed = d.orders.get(stop.id).await.unwrap().unwrap();
    assert_eq!(rearmed.status, OrderStatus::Monitoring);
    assert_eq!(rearmed.broker_order_id, None);
    assert_eq!(rearmed.executed_price, None);
    assert_eq!(
        d.orders.get(take.id).await.unwrap().unwrap().status,
        OrderStatus::CancelledByOco
    );
    assert!(d.broker.fills().await.is_empty());

    gateway.hold_market_orders.store(false, Ordering::SeqCst);
    let report = d.coordinator.monitor_tick().await.unwrap();
    assert_eq!(report.executed, 1);
    assert_eq!(
        d.orders.get(stop.id).await.unwrap().unwrap().status,
        OrderStatus::Executed
    );
    assert_eq!(d.broker.fills().await.len(), 1);
}

#[tokio::test]
async fn test_executed_bracket_counts_as_one_fill() {
    let d = desk().await;
    d.coordinator
        .place_bracket("acc-1", "SBER", PositionSide::Long, 10, dec!(95), dec!(110))
        .await
        .unwrap();
    d.feed.set_price("SBER", dec!(94)).await;
    assert_eq!(d.coordinator.monitor_tick().await.unwrap().executed, 1);

    // Re-entry after the stop: only the market sell is a fill, so the first trade tier applies
    let guard = CooldownGuard::new(d.orders.clone(), d.settings.clone());
    match guard
        .check("acc-1", "SBER", Direction::Buy, Utc::now())
        .await
        .unwrap()
    {
        CooldownDecision::Blocked { reason, remaining } => {
            assert!(reason.contains("first trade"), "{reason}");
            assert!(remaining <= ChronoDuration::minutes(15));
        }
        CooldownDecision::Allowed => panic!("expected first trade cooldown"),
    }
}
