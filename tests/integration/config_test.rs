//! Configuration loading and end-to-end paper runs

use position_guard::cli::build_paper_engine;
use position_guard::config::Config;
use position_guard::risk::{RiskStateRepository, TrailingType};
use rust_decimal_macros::dec;

const EXAMPLE: &str = include_str!("../../config.toml.example");

#[test]
fn test_example_config_parses() {
    let config: Config = toml::from_str(EXAMPLE).unwrap();

    assert_eq!(config.watcher.watcher_interval_secs, 15);
    assert_eq!(config.watcher.oco_interval_secs, 30);
    assert_eq!(config.risk.stop_loss_pct, dec!(0.02));
    assert_eq!(config.risk.trailing_type, TrailingType::Percent);
    assert_eq!(config.rate_limit.orders_per_minute, 30);
    assert_eq!(config.cooldown.reversal_minutes, 60);
    assert_eq!(config.sizing.max_sector_pct, dec!(0.30));
    assert!(config.journal.path.is_none());
    assert_eq!(config.paper.accounts.len(), 1);
    assert_eq!(config.paper.accounts[0].positions.len(), 3);
    assert_eq!(config.paper.prices.get("SBER"), Some(&dec!(252.5)));
}

#[test]
fn test_minimal_config_uses_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.risk.take_profit_pct, dec!(0.06));
    assert_eq!(config.cooldown.same_direction_minutes, 30);
    assert!(config.paper.accounts.is_empty());
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, EXAMPLE).unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.paper.accounts[0].id, "paper-1");
    assert!(Config::load(dir.path().join("missing.toml")).is_err());
}

#[tokio::test]
async fn test_single_pass_over_example_accounts() {
    let config: Config = toml::from_str(EXAMPLE).unwrap();
    let engine = build_paper_engine(&config, false).await.unwrap();

    let summary = engine.run_once().await;
    let watcher = summary.watcher.unwrap();
    // RUB cash balance is not risk-managed
    assert_eq!(watcher.positions, 2);
    assert_eq!(watcher.opened, 2);
    assert_eq!(watcher.stop_losses + watcher.final_take_profits, 0);

    let sweep = summary.sweep.unwrap();
    assert_eq!(sweep.checked, 2);
    assert_eq!(sweep.exits, 0);

    let sync = summary.sync.unwrap();
    assert_eq!(sync.closed, 0);
    assert_eq!(summary.oco.unwrap().monitored, 0);
    assert_eq!(summary.reconciled, Some(0));
}

#[tokio::test]
async fn test_paused_engine_does_nothing() {
    let config: Config = toml::from_str(EXAMPLE).unwrap();
    let engine = build_paper_engine(&config, true).await.unwrap();

    let summary = engine.run_once().await;
    assert!(summary.watcher.unwrap().paused);
    assert!(summary.oco.unwrap().paused);
    assert!(summary.sweep.unwrap().paused);
    assert!(summary.sync.unwrap().paused);
    assert!(engine.context().states.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_journal_path_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let mut config: Config = toml::from_str(EXAMPLE).unwrap();
    config.journal.path = Some(path.clone());

    let engine = build_paper_engine(&config, false).await.unwrap();
    let watcher = engine.watcher_pass().await.unwrap();

    let content = tokio::fs::read_to_string(&path).await.unwrap();
    assert_eq!(content.lines().count(), watcher.events);
    assert!(content.contains("POSITION_ENTERED"));
}
