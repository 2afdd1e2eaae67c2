//! Position watcher, sweep and sync integration tests

use position_guard::broker::{BrokerAccounts, BrokerPosition, InstrumentKind, PaperBroker, PositionSide};
use position_guard::config::SizingConfig;
use position_guard::execution::{ExitExecutor, InMemoryOrderStore, PanicSwitch, RateLimiter};
use position_guard::market::StaticPriceFeed;
use position_guard::risk::{
    CapitalSizingAdvisor, InMemoryEventLog, InMemoryRiskRuleStore, InMemoryRiskStateRepository, JsonlJournal,
    PositionRiskState, RiskDefaults, RiskEvent, RiskEventLog, RiskEventType, RiskKey,
    RiskStateRepository, StateSource, TrailingType,
};
use position_guard::settings::{keys, InMemorySettings, SettingsStore};
use position_guard::watcher::{InMemoryStageStore, PositionSync, PositionWatcher, RiskContext, SlTpSweep, StageStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

struct Harness {
    feed: Arc<StaticPriceFeed>,
    broker: Arc<PaperBroker>,
    settings: Arc<InMemorySettings>,
    states: Arc<InMemoryRiskStateRepository>,
    events: Arc<InMemoryEventLog>,
    stages: Arc<InMemoryStageStore>,
    panic: Arc<PanicSwitch>,
    watcher: PositionWatcher,
    sweep: SlTpSweep,
    sync: PositionSync,
}

fn position(instrument: &str, side: PositionSide, quantity: u64, avg: Decimal) -> BrokerPosition {
    BrokerPosition {
        instrument_id: instrument.to_string(),
        kind: InstrumentKind::Share,
        side,
        quantity,
        average_price: Some(avg),
    }
}

async fn harness_with_log(
    side: PositionSide,
    quantity: u64,
    events_sink: Option<Arc<dyn RiskEventLog>>,
) -> Harness {
    let feed = Arc::new(StaticPriceFeed::new());
    feed.set_price("SBER", dec!(100)).await;
    let broker = Arc::new(PaperBroker::new(feed.clone()));
    broker
        .set_position("acc-1", position("SBER", side, quantity, dec!(100)))
        .await;

    let settings = Arc::new(InMemorySettings::new());
    settings.set(keys::DEFAULT_STOP_LOSS_PCT, "0.02".to_string());
    settings.set(keys::DEFAULT_TAKE_PROFIT_PCT, "0.06".to_string());
    settings.set(keys::DEFAULT_TRAILING_PCT, "0".to_string());
    settings.set(keys::COOLDOWN_SAME_DIRECTION_MINUTES, "0".to_string());

    let orders = Arc::new(InMemoryOrderStore::new());
    let exits = Arc::new(ExitExecutor::new(
        broker.clone(),
        orders,
        Arc::new(RateLimiter::new(600, Duration::from_millis(10))),
        settings.clone(),
    ));
    let states = Arc::new(InMemoryRiskStateRepository::new());
    let events = Arc::new(InMemoryEventLog::new());
    let stages = Arc::new(InMemoryStageStore::new());
    let panic = Arc::new(PanicSwitch::default());

    let ctx = RiskContext {
        accounts: broker.clone(),
        prices: feed.clone(),
        rules: Arc::new(InMemoryRiskRuleStore::new()),
        states: states.clone(),
        events: match events_sink {
            Some(sink) => sink,
            None => events.clone() as Arc<dyn RiskEventLog>,
        },
        stages: stages.clone(),
        settings: settings.clone(),
        exits,
        panic: panic.clone(),
        sizing: Arc::new(CapitalSizingAdvisor::new(SizingConfig::default())),
    };

    Harness {
        feed,
        broker,
        settings,
        states,
        events,
        stages,
        panic,
        watcher: PositionWatcher::new(ctx.clone()),
        sweep: SlTpSweep::new(ctx.clone()),
        sync: PositionSync::new(ctx),
    }
}

async fn harness(side: PositionSide, quantity: u64) -> Harness {
    harness_with_log(side, quantity, None).await
}

fn long_key() -> RiskKey {
    RiskKey::new("acc-1", "SBER", PositionSide::Long)
}

#[tokio::test]
async fn test_two_stage_take_profit() {
    let h = harness(PositionSide::Long, 10).await;
    assert_ok!(h.watcher.tick().await);

    h.feed.set_price("SBER", dec!(106)).await;
    let first = h.watcher.tick().await.unwrap();
    assert_eq!(first.partial_take_profits, 1);
    assert_eq!(h.stages.get("acc-1", "SBER").await.unwrap(), 1);
    assert!(h.states.find(&long_key()).await.unwrap().is_some());
    let positions = h.broker.get_open_positions("acc-1").await.unwrap();
    assert_eq!(positions[0].quantity, 5);

    let second = h.watcher.tick().await.unwrap();
    assert_eq!(second.final_take_profits, 1);
    assert_eq!(h.stages.get("acc-1", "SBER").await.unwrap(), 0);
    assert!(h.states.find(&long_key()).await.unwrap().is_none());
    assert!(h.broker.get_open_positions("acc-1").await.unwrap().is_empty());

    let fills = h.broker.fills().await;
    assert_eq!(fills.len(), 2);
    assert_eq!(fills[0].lots, 5);
    assert_eq!(fills[1].lots, 5);
}

#[tokio::test]
async fn test_second_stage_waits_for_cooldown() {
    let h = harness(PositionSide::Long, 10).await;
    h.settings
        .set(keys::COOLDOWN_SAME_DIRECTION_MINUTES, "30".to_string());
    h.feed.set_price("SBER", dec!(107)).await;

    let first = h.watcher.tick().await.unwrap();
    assert_eq!(first.partial_take_profits, 1);

    let second = h.watcher.tick().await.unwrap();
    assert_eq!(second.blocked, 1);
    assert_eq!(h.stages.get("acc-1", "SBER").await.unwrap(), 1);
    assert!(h.states.find(&long_key()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_stop_loss_trigger_boundary() {
    let h = harness(PositionSide::Long, 10).await;
    h.watcher.tick().await.unwrap();

    h.feed.set_price("SBER", dec!(98.1)).await;
    let report = h.watcher.tick().await.unwrap();
    assert_eq!(report.stop_losses, 0);
    assert!(h.states.find(&long_key()).await.unwrap().is_some());

    h.feed.set_price("SBER", dec!(97.9)).await;
    let report = h.watcher.tick().await.unwrap();
    assert_eq!(report.stop_losses, 1);
    assert!(h.states.find(&long_key()).await.unwrap().is_none());
    assert_eq!(h.events.count(RiskEventType::PositionClosed).await, 1);
}

#[tokio::test]
async fn test_short_stop_loss() {
    let h = harness(PositionSide::Short, 3).await;
    h.watcher.tick().await.unwrap();

    h.feed.set_price("SBER", dec!(102.5)).await;
    let report = h.watcher.tick().await.unwrap();
    assert_eq!(report.stop_losses, 1);
    assert!(h.broker.get_open_positions("acc-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unchanged_price_emits_no_events() {
    let h = harness(PositionSide::Long, 10).await;
    let first = h.watcher.tick().await.unwrap();
    assert!(first.events > 0);
    let count = h.events.len().await;

    let second = h.watcher.tick().await.unwrap();
    assert_eq!(second.events, 0);
    assert_eq!(h.events.len().await, count);
}

#[tokio::test]
async fn test_trailing_ratchets_to_break_even() {
    let h = harness(PositionSide::Long, 10).await;
    h.settings.set(keys::DEFAULT_TRAILING_PCT, "0.03".to_string());
    h.settings.set(keys::DEFAULT_TAKE_PROFIT_PCT, "0.5".to_string());
    h.watcher.tick().await.unwrap();

    h.feed.set_price("SBER", dec!(110)).await;
    h.watcher.tick().await.unwrap();
    let state = h.states.find(&long_key()).await.unwrap().unwrap();
    assert_eq!(state.stop_loss_level, Some(dec!(100)));
    assert_eq!(state.high_watermark, Some(dec!(110)));
    assert!(state.trailing_active);

    // Pullback does not loosen the stop or lower the watermark
    h.feed.set_price("SBER", dec!(104)).await;
    h.watcher.tick().await.unwrap();
    let state = h.states.find(&long_key()).await.unwrap().unwrap();
    assert_eq!(state.stop_loss_level, Some(dec!(100)));
    assert_eq!(state.high_watermark, Some(dec!(110)));

    h.feed.set_price("SBER", dec!(99.9)).await;
    let report = h.watcher.tick().await.unwrap();
    assert_eq!(report.stop_losses, 1);
    assert!(h.events.count(RiskEventType::TrailingUpdated).await >= 1);
}

#[tokio::test]
async fn test_cash_positions_ignored() {
    let h = harness(PositionSide::Long, 10).await;
    h.broker
        .set_position(
            "acc-1",
            BrokerPosition {
                instrument_id: "RUB".to_string(),
                kind: InstrumentKind::Currency,
                side: PositionSide::Long,
                quantity: 10000,
                average_price: Some(dec!(1)),
            },
        )
        .await;

    let report = h.watcher.tick().await.unwrap();
    assert_eq!(report.positions, 1);
    assert_eq!(h.states.len().await, 1);
}

#[tokio::test]
async fn test_missing_average_price_skipped() {
    let h = harness(PositionSide::Long, 10).await;
    let mut broken = position("SBER", PositionSide::Long, 10, dec!(100));
    broken.average_price = None;
    h.broker.set_position("acc-1", broken).await;

    let report = h.watcher.tick().await.unwrap();
    assert_eq!(report.skipped, 1);
    assert!(h.states.is_empty().await);
}

#[tokio::test]
async fn test_sweep_catches_breach_without_watcher() {
    let h = harness(PositionSide::Long, 10).await;
    h.watcher.tick().await.unwrap();

    h.feed.set_price("SBER", dec!(97)).await;
    let report = h.sweep.run().await.unwrap();
    assert_eq!(report.checked, 1);
    assert_eq!(report.exits, 1);
    assert!(h.states.is_empty().await);
}

#[tokio::test]
async fn test_sweep_after_partial_closes_remainder_only() {
    let h = harness(PositionSide::Long, 10).await;
    h.watcher.tick().await.unwrap();

    h.feed.set_price("SBER", dec!(106)).await;
    let first = h.watcher.tick().await.unwrap();
    assert_eq!(first.partial_take_profits, 1);
    let state = h.states.find(&long_key()).await.unwrap().unwrap();
    assert_eq!(state.quantity_snapshot, 5);

    let report = h.sweep.run().await.unwrap();
    assert_eq!(report.exits, 1);
    assert!(h.states.is_empty().await);
    assert!(h.broker.get_open_positions("acc-1").await.unwrap().is_empty());

    let fills = h.broker.fills().await;
    assert_eq!(fills.len(), 2);
    assert_eq!(fills[1].lots, 5);
}

#[tokio::test]
async fn test_sync_refreshes_and_retires_states() {
    let h = harness(PositionSide::Long, 10).await;
    h.watcher.tick().await.unwrap();

    h.broker
        .set_position("acc-1", position("SBER", PositionSide::Long, 14, dec!(101)))
        .await;
    let report = h.sync.run().await.unwrap();
    assert_eq!(report.refreshed, 1);
    let state = h.states.find(&long_key()).await.unwrap().unwrap();
    assert_eq!(state.quantity_snapshot, 14);
    assert_eq!(state.average_price_snapshot, dec!(101));

    h.stages.set("acc-1", "SBER", 1).await.unwrap();
    h.broker.remove_position("acc-1", "SBER").await;
    let report = h.sync.run().await.unwrap();
    assert_eq!(report.closed, 1);
    assert!(h.states.is_empty().await);
    assert_eq!(h.stages.get("acc-1", "SBER").await.unwrap(), 0);
    assert_eq!(h.events.count(RiskEventType::PositionClosed).await, 1);
}

#[tokio::test]
async fn test_sync_keeps_state_when_positions_unavailable() {
    let h = harness(PositionSide::Long, 10).await;
    let params = RiskDefaults {
        stop_loss_pct: dec!(0.02),
        take_profit_pct: dec!(0.06),
        trailing_pct: dec!(0),
        trailing_type: TrailingType::Percent,
        min_step_ticks: 0,
        tick_size: dec!(0.01),
    };
    // The paper broker does not know this account, so the lookup fails
    let orphan = PositionRiskState::open(
        &RiskKey::new("acc-unknown", "GAZP", PositionSide::Short),
        dec!(160),
        4,
        &params,
        StateSource::Defaults,
        chrono::Utc::now(),
    );
    h.states.save(&orphan).await.unwrap();

    let report = h.sync.run().await.unwrap();
    assert_eq!(report.accounts_skipped, 1);
    assert_eq!(report.closed, 0);
    assert!(h.states.find(&orphan.key()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_panic_stop_freezes_all_loops() {
    let h = harness(PositionSide::Long, 10).await;
    h.watcher.tick().await.unwrap();
    let events_before = h.events.len().await;

    h.panic.engage();
    h.feed.set_price("SBER", dec!(90)).await;
    h.broker.remove_position("acc-1", "SBER").await;

    assert!(h.watcher.tick().await.unwrap().paused);
    assert!(h.sweep.run().await.unwrap().paused);
    assert!(h.sync.run().await.unwrap().paused);
    assert_eq!(h.states.len().await, 1);
    assert_eq!(h.events.len().await, events_before);

    h.panic.release();
    let report = h.sync.run().await.unwrap();
    assert_eq!(report.closed, 1);
}

#[tokio::test]
async fn test_events_written_to_journal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let journal: Arc<dyn RiskEventLog> = Arc::new(JsonlJournal::open(&path).await.unwrap());
    let h = harness_with_log(PositionSide::Long, 10, Some(journal)).await;

    let report = h.watcher.tick().await.unwrap();
    let content = tokio::fs::read_to_string(&path).await.unwrap();
    let events: Vec<RiskEvent> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.len(), report.events);
    assert!(events
        .iter()
        .any(|e| e.event_type == RiskEventType::PositionEntered));
}
