//! Position watcher loop body

use super::triggers::{handle_triggers, TriggerOutcome};
use super::{RiskContext, WatcherError};
use crate::broker::BrokerPosition;
use crate::risk::{
    recalculate, resolve_params, PositionRiskState, RiskEvent, RiskEventType, RiskKey, StoreError,
};
use crate::settings::risk_defaults;
use crate::telemetry::{increment, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::time::Instant;

/// Summary of one watcher pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatcherReport {
    pub paused: bool,
    pub accounts: usize,
    pub accounts_skipped: usize,
    pub positions: usize,
    pub opened: usize,
    pub skipped: usize,
    pub events: usize,
    pub stop_losses: usize,
    pub partial_take_profits: usize,
    pub final_take_profits: usize,
    pub blocked: usize,
    pub failed: usize,
}

impl WatcherReport {
    fn record(&mut self, outcome: TriggerOutcome) {
        match outcome {
            TriggerOutcome::NotTriggered => {}
            TriggerOutcome::StopLoss { .. } => self.stop_losses += 1,
            TriggerOutcome::PartialTakeProfit { .. } => self.partial_take_profits += 1,
            TriggerOutcome::FinalTakeProfit { .. } => self.final_take_profits += 1,
            TriggerOutcome::Blocked => self.blocked += 1,
            TriggerOutcome::Failed => self.failed += 1,
        }
    }
}

/// Walks every account's open positions, refreshes risk state and fires exits
pub struct PositionWatcher {
    ctx: RiskContext,
}

impl PositionWatcher {
    pub fn new(ctx: RiskContext) -> Self {
        Self { ctx }
    }

    /// One pass over all accounts
    pub async fn tick(&self) -> Result<WatcherReport, WatcherError> {
        let mut report = WatcherReport::default();
        if self.ctx.panic.is_engaged() {
            tracing::warn!("Panic stop engaged, skipping watcher pass");
            report.paused = true;
            return Ok(report);
        }
        let start = Instant::now();

        let accounts = self.ctx.accounts.list_accounts().await?;
        report.accounts = accounts.len();

        for account_id in &accounts {
            let positions = match self.ctx.accounts.get_open_positions(account_id).await {
                Ok(positions) => positions,
                Err(e) if e.is_transient() => {
                    tracing::warn!(account = %account_id, error = %e, "Positions unavailable, skipping account");
                    report.accounts_skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(account = %account_id, error = %e, "Positions lookup failed, skipping account");
                    report.accounts_skipped += 1;
                    continue;
                }
            };

            for position in positions.iter().filter(|p| p.is_tracked()) {
                report.positions += 1;
                self.process_position(account_id, position, &mut report).await;
            }
        }

        set_gauge(GaugeMetric::TrackedPositions, report.positions as f64);
        record_latency(LatencyMetric::WatcherTick, start.elapsed());
        tracing::debug!(?report, "Watcher pass complete");
        Ok(report)
    }

    async fn process_position(&self, account_id: &str, position: &BrokerPosition, report: &mut WatcherReport) {
        let instrument = position.instrument_id.as_str();
        let price = match self.ctx.prices.get_current_price(instrument).await {
            Ok(price) => price,
            Err(e) => {
                tracing::warn!(account = account_id, instrument, error = %e, "Price unavailable, skipping");
                increment(CounterMetric::PriceFetchFailures, 1);
                report.skipped += 1;
                return;
            }
        };
        let Some(average_price) = position.average_price.filter(|p| *p > Decimal::ZERO) else {
            tracing::warn!(account = account_id, instrument, "Missing average price, skipping");
            report.skipped += 1;
            return;
        };

        let key = RiskKey::new(account_id, instrument, position.side);
        let existing = match self.ctx.states.find(&key).await {
            Ok(existing) => existing,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Risk state lookup failed, skipping");
                report.skipped += 1;
                return;
            }
        };

        let now = Utc::now();
        let mut events = Vec::new();
        let state = match existing {
            Some(mut state) => {
                if state.average_price_snapshot != average_price
                    || state.quantity_snapshot != position.quantity
                {
                    tracing::debug!(
                        key = %key,
                        average_price = %average_price,
                        quantity = position.quantity,
                        "Position snapshot changed"
                    );
                    state.average_price_snapshot = average_price;
                    state.quantity_snapshot = position.quantity;
                }
                state
            }
            None => match self
                .open_state(&key, average_price, position.quantity, price, now, &mut events)
                .await
            {
                Ok(state) => {
                    report.opened += 1;
                    state
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Could not open risk state, skipping");
                    report.skipped += 1;
                    return;
                }
            },
        };

        let recalculation = match recalculate(&state, price, now) {
            Ok(recalculation) => recalculation,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Recalculation skipped");
                report.skipped += 1;
                return;
            }
        };
        events.extend(recalculation.events);

        if let Err(e) = self.ctx.states.save(&recalculation.state).await {
            tracing::error!(key = %key, error = %e, "Failed to persist risk state");
            report.failed += 1;
            return;
        }
        report.events += events.len();
        self.ctx.record_events(&events).await;

        let outcome = handle_triggers(&self.ctx, &recalculation.state, position.quantity, price).await;
        report.record(outcome);
    }

    async fn open_state(
        &self,
        key: &RiskKey,
        average_price: Decimal,
        quantity: u64,
        price: Decimal,
        now: DateTime<Utc>,
        events: &mut Vec<RiskEvent>,
    ) -> Result<PositionRiskState, StoreError> {
        let defaults = risk_defaults(self.ctx.settings.as_ref());
        let (rule, created) = self
            .ctx
            .rules
            .get_or_create(&key.instrument_id, &defaults, now)
            .await?;
        if created {
            events.push(
                RiskEvent::new(
                    &key.account_id,
                    &key.instrument_id,
                    RiskEventType::RiskRuleApplied,
                    "rule created from defaults",
                    now,
                )
                .with_details(format!("sl_pct={} tp_pct={}", rule.stop_loss_pct, rule.take_profit_pct)),
            );
        }

        let (params, source) = resolve_params(Some(&rule), &defaults);
        let state = PositionRiskState::open(key, average_price, quantity, &params, source, now);
        events.push(
            RiskEvent::new(
                &key.account_id,
                &key.instrument_id,
                RiskEventType::PositionEntered,
                "position observed",
                now,
            )
            .with_price(price, None)
            .with_details(format!(
                "side={} quantity={} average_price={} source={:?}",
                key.side, quantity, average_price, source
            )),
        );
        tracing::info!(key = %key, %average_price, quantity, ?source, "Risk state opened");
        Ok(state)
    }
}
