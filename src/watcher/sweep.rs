//! Stored-level SL/TP sweep
//!
//! Re-checks persisted levels against fresh prices without recalculating them,
//! catching breaches for positions whose watcher pass was skipped.

use super::triggers::{handle_triggers, TriggerOutcome};
use super::{RiskContext, WatcherError};
use crate::telemetry::{increment, CounterMetric};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub paused: bool,
    pub checked: usize,
    pub skipped: usize,
    pub exits: usize,
    pub blocked: usize,
    pub failed: usize,
}

pub struct SlTpSweep {
    ctx: RiskContext,
}

impl SlTpSweep {
    pub fn new(ctx: RiskContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self) -> Result<SweepReport, WatcherError> {
        let mut report = SweepReport::default();
        if self.ctx.panic.is_engaged() {
            tracing::warn!("Panic stop engaged, skipping SL/TP sweep");
            report.paused = true;
            return Ok(report);
        }

        for state in self.ctx.states.list().await? {
            report.checked += 1;
            let price = match self.ctx.prices.get_current_price(&state.instrument_id).await {
                Ok(price) => price,
                Err(e) => {
                    tracing::warn!(key = %state.key(), error = %e, "Price unavailable, skipping");
                    increment(CounterMetric::PriceFetchFailures, 1);
                    report.skipped += 1;
                    continue;
                }
            };

            match handle_triggers(&self.ctx, &state, state.quantity_snapshot, price).await {
                TriggerOutcome::NotTriggered => {}
                TriggerOutcome::Blocked => report.blocked += 1,
                TriggerOutcome::Failed => report.failed += 1,
                _ => report.exits += 1,
            }
        }

        tracing::debug!(?report, "SL/TP sweep complete");
        Ok(report)
    }
}
