//! Task scheduler for the monitoring loops
//!
//! Four independently timed loops: position watcher, virtual order / OCO
//! monitor (followed by broker reconciliation), SL/TP sweep and position sync.
//! All stop when the shutdown channel flips to `true`.

use crate::config::WatcherConfig;
use crate::execution::{CooldownPolicy, OcoCoordinator, OcoTickReport};
use crate::watcher::{
    PositionSync, PositionWatcher, RiskContext, SlTpSweep, SweepReport, SyncReport, WatcherReport,
};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Results of one pass of every loop; `None` where the pass was aborted
#[derive(Debug, Default)]
pub struct PassSummary {
    pub watcher: Option<WatcherReport>,
    pub oco: Option<OcoTickReport>,
    pub reconciled: Option<usize>,
    pub sweep: Option<SweepReport>,
    pub sync: Option<SyncReport>,
}

/// Loop periods
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub watcher: Duration,
    pub oco: Duration,
    pub sweep: Duration,
    pub sync: Duration,
}

impl From<&WatcherConfig> for Schedule {
    fn from(config: &WatcherConfig) -> Self {
        Self {
            watcher: Duration::from_secs(config.watcher_interval_secs.max(1)),
            oco: Duration::from_secs(config.oco_interval_secs.max(1)),
            sweep: Duration::from_secs(config.sweep_interval_secs.max(1)),
            sync: Duration::from_secs(config.sync_interval_secs.max(1)),
        }
    }
}

/// Owns the loop bodies and runs them on their schedule
pub struct Engine {
    ctx: RiskContext,
    watcher: PositionWatcher,
    oco: Arc<OcoCoordinator>,
    sweep: SlTpSweep,
    sync: PositionSync,
    schedule: Schedule,
}

impl Engine {
    pub fn new(ctx: RiskContext, oco: Arc<OcoCoordinator>, schedule: Schedule) -> Self {
        Self {
            watcher: PositionWatcher::new(ctx.clone()),
            sweep: SlTpSweep::new(ctx.clone()),
            sync: PositionSync::new(ctx.clone()),
            ctx,
            oco,
            schedule,
        }
    }

    pub fn context(&self) -> &RiskContext {
        &self.ctx
    }

    pub fn oco(&self) -> &OcoCoordinator {
        &self.oco
    }

    pub async fn watcher_pass(&self) -> Option<WatcherReport> {
        match self.watcher.tick().await {
            Ok(report) => {
                if report.stop_losses + report.partial_take_profits + report.final_take_profits > 0 {
                    tracing::info!(
                        stop_losses = report.stop_losses,
                        partial_take_profits = report.partial_take_profits,
                        final_take_profits = report.final_take_profits,
                        "Watcher pass closed positions"
                    );
                }
                Some(report)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Watcher pass aborted");
                None
            }
        }
    }

    pub async fn oco_pass(&self) -> (Option<OcoTickReport>, Option<usize>) {
        let tick = match self.oco.monitor_tick().await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "Virtual order pass aborted");
                None
            }
        };
        if self.ctx.panic.is_engaged() {
            return (tick, None);
        }
        let reconciled = match self.oco.reconcile().await {
            Ok(count) => {
                if count > 0 {
                    tracing::info!(count, "Orders reconciled from broker status");
                }
                Some(count)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reconciliation aborted");
                None
            }
        };

        // Fills inside the cooldown lookback are still needed by the cooldown guard
        let lookback = CooldownPolicy::from_settings(self.ctx.settings.as_ref()).lookback;
        if let Err(e) = self.oco.prune(Utc::now() - lookback).await {
            tracing::warn!(error = %e, "Order pruning failed");
        }
        (tick, reconciled)
    }

    pub async fn sweep_pass(&self) -> Option<SweepReport> {
        self.sweep
            .run()
            .await
            .map_err(|e| tracing::warn!(error = %e, "SL/TP sweep aborted"))
            .ok()
    }

    pub async fn sync_pass(&self) -> Option<SyncReport> {
        self.sync
            .run()
            .await
            .map_err(|e| tracing::warn!(error = %e, "Position sync aborted"))
            .ok()
    }

    /// Run every loop body once, in schedule order
    pub async fn run_once(&self) -> PassSummary {
        let watcher = self.watcher_pass().await;
        let (oco, reconciled) = self.oco_pass().await;
        let sweep = self.sweep_pass().await;
        let sync = self.sync_pass().await;
        PassSummary {
            watcher,
            oco,
            reconciled,
            sweep,
            sync,
        }
    }

    /// Spawn the four loops
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let schedule = self.schedule;
        tracing::info!(
            watcher_secs = schedule.watcher.as_secs(),
            oco_secs = schedule.oco.as_secs(),
            sweep_secs = schedule.sweep.as_secs(),
            sync_secs = schedule.sync.as_secs(),
            "Starting monitoring loops"
        );

        let engine = Arc::clone(&self);
        let watcher = spawn_loop("watcher", schedule.watcher, shutdown.clone(), move || {
            let engine = Arc::clone(&engine);
            async move {
                engine.watcher_pass().await;
            }
        });
        let engine = Arc::clone(&self);
        let oco = spawn_loop("oco", schedule.oco, shutdown.clone(), move || {
            let engine = Arc::clone(&engine);
            async move {
                engine.oco_pass().await;
            }
        });
        let engine = Arc::clone(&self);
        let sweep = spawn_loop("sweep", schedule.sweep, shutdown.clone(), move || {
            let engine = Arc::clone(&engine);
            async move {
                engine.sweep_pass().await;
            }
        });
        let engine = Arc::clone(&self);
        let sync = spawn_loop("sync", schedule.sync, shutdown, move || {
            let engine = Arc::clone(&engine);
            async move {
                engine.sync_pass().await;
            }
        });

        vec![watcher, oco, sweep, sync]
    }
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut pass: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => pass().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(task = name, "Loop stopped");
                        return;
                    }
                }
            }
        }
    })
}
