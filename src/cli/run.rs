//! Run command implementation

use crate::broker::{BrokerPosition, PaperBroker};
use crate::config::Config;
use crate::engine::{Engine, PassSummary, Schedule};
use crate::execution::{ExitExecutor, InMemoryOrderStore, OcoCoordinator, PanicSwitch, RateLimiter};
use crate::market::StaticPriceFeed;
use crate::risk::{
    CapitalSizingAdvisor, FanoutEventLog, InMemoryEventLog, InMemoryRiskRuleStore, InMemoryRiskStateRepository,
    JsonlJournal, RiskEventLog,
};
use crate::settings::{InMemorySettings, SettingsStore};
use crate::watcher::{InMemoryStageStore, RiskContext};
use anyhow::Context;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Engage the panic stop before the first pass
    #[arg(long)]
    pub paused: bool,

    /// Run every loop once and exit
    #[arg(long)]
    pub once: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let engine = Arc::new(build_paper_engine(config, self.paused).await?);

        if self.once {
            let summary = engine.run_once().await;
            print_summary(&summary);
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = Arc::clone(&engine).spawn(shutdown_rx);

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        tracing::info!("Shutdown requested");
        shutdown_tx.send(true).ok();

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Loop task failed");
            }
        }
        Ok(())
    }
}

/// Wire the engine against an in-memory paper broker seeded from config
pub async fn build_paper_engine(config: &Config, paused: bool) -> anyhow::Result<Engine> {
    let feed = Arc::new(StaticPriceFeed::with_prices(config.paper.prices.clone()));
    let broker = Arc::new(PaperBroker::new(feed.clone()));
    for account in &config.paper.accounts {
        broker.add_account(&account.id).await;
        for position in &account.positions {
            broker
                .set_position(
                    &account.id,
                    BrokerPosition {
                        instrument_id: position.instrument_id.clone(),
                        kind: position.kind,
                        side: position.side,
                        quantity: position.quantity,
                        average_price: Some(position.average_price),
                    },
                )
                .await;
        }
    }
    tracing::info!(
        accounts = config.paper.accounts.len(),
        instruments = config.paper.prices.len(),
        "Paper broker seeded"
    );

    let settings: Arc<dyn SettingsStore> = Arc::new(InMemorySettings::from_config(config));
    let events: Arc<dyn RiskEventLog> = match &config.journal.path {
        Some(path) => {
            let journal = JsonlJournal::open(path)
                .await
                .with_context(|| format!("Failed to open journal {}", path.display()))?;
            tracing::info!(path = %path.display(), "Risk event journal enabled");
            let sinks: Vec<Arc<dyn RiskEventLog>> =
                vec![Arc::new(InMemoryEventLog::new()), Arc::new(journal)];
            Arc::new(FanoutEventLog::new(sinks))
        }
        None => Arc::new(InMemoryEventLog::new()),
    };

    let orders = Arc::new(InMemoryOrderStore::new());
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit.orders_per_minute,
        Duration::from_millis(config.rate_limit.backoff_ms),
    ));
    let exits = Arc::new(ExitExecutor::new(
        broker.clone(),
        orders.clone(),
        limiter,
        Arc::clone(&settings),
    ));
    let panic = Arc::new(PanicSwitch::default());
    if paused || config.watcher.start_paused {
        panic.engage();
    }

    let ctx = RiskContext {
        accounts: broker.clone(),
        prices: feed.clone(),
        rules: Arc::new(InMemoryRiskRuleStore::new()),
        states: Arc::new(InMemoryRiskStateRepository::new()),
        events,
        stages: Arc::new(InMemoryStageStore::new()),
        settings,
        exits: exits.clone(),
        panic: panic.clone(),
        sizing: Arc::new(CapitalSizingAdvisor::new(config.sizing.clone())),
    };
    let oco = Arc::new(OcoCoordinator::new(orders, broker, feed, exits, panic));
    Ok(Engine::new(ctx, oco, Schedule::from(&config.watcher)))
}

fn print_summary(summary: &PassSummary) {
    println!("position-guard single pass");
    match &summary.watcher {
        Some(r) if r.paused => println!("  Watcher: paused"),
        Some(r) => println!(
            "  Watcher: {} positions, {} opened, {} skipped, {} events, {} stop-loss, {} partial TP, {} final TP, {} blocked",
            r.positions,
            r.opened,
            r.skipped,
            r.events,
            r.stop_losses,
            r.partial_take_profits,
            r.final_take_profits,
            r.blocked
        ),
        None => println!("  Watcher: aborted"),
    }
    match &summary.oco {
        Some(r) if r.paused => println!("  Virtual orders: paused"),
        Some(r) => println!(
            "  Virtual orders: {} monitored, {} executed, {} cancelled by OCO",
            r.monitored, r.executed, r.cancelled_by_oco
        ),
        None => println!("  Virtual orders: aborted"),
    }
    if let Some(count) = summary.reconciled {
        println!("  Reconciled: {count}");
    }
    match &summary.sweep {
        Some(r) => println!("  Sweep: {} checked, {} exits", r.checked, r.exits),
        None => println!("  Sweep: aborted"),
    }
    match &summary.sync {
        Some(r) => println!(
            "  Sync: {} checked, {} refreshed, {} closed",
            r.checked, r.refreshed, r.closed
        ),
        None => println!("  Sync: aborted"),
    }
}
