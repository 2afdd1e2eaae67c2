//! Position-to-storage sync
//!
//! Refreshes quantity and average price snapshots for tracked states and
//! retires states whose position is no longer open. Accounts whose positions
//! cannot be fetched are left untouched.

use super::triggers::close_state;
use super::{RiskContext, WatcherError};
use crate::broker::BrokerPosition;
use crate::risk::PositionRiskState;
use chrono::Utc;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub paused: bool,
    pub checked: usize,
    pub refreshed: usize,
    pub closed: usize,
    pub accounts_skipped: usize,
}

pub struct PositionSync {
    ctx: RiskContext,
}

impl PositionSync {
    pub fn new(ctx: RiskContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self) -> Result<SyncReport, WatcherError> {
        let mut report = SyncReport::default();
        if self.ctx.panic.is_engaged() {
            tracing::warn!("Panic stop engaged, skipping position sync");
            report.paused = true;
            return Ok(report);
        }

        let mut by_account: BTreeMap<String, Vec<PositionRiskState>> = BTreeMap::new();
        for state in self.ctx.states.list().await? {
            by_account.entry(state.account_id.clone()).or_default().push(state);
        }

        for (account_id, states) in by_account {
            let positions = match self.ctx.accounts.get_open_positions(&account_id).await {
                Ok(positions) => positions,
                Err(e) => {
                    tracing::warn!(account = %account_id, error = %e, "Positions unavailable, sync skipped");
                    report.accounts_skipped += 1;
                    continue;
                }
            };

            for mut state in states {
                report.checked += 1;
                match find_position(&positions, &state) {
                    Some(position) => {
                        let average = position.average_price.unwrap_or(state.average_price_snapshot);
                        if state.quantity_snapshot == position.quantity
                            && state.average_price_snapshot == average
                        {
                            continue;
                        }
                        state.quantity_snapshot = position.quantity;
                        state.average_price_snapshot = average;
                        state.updated_at = Utc::now();
                        self.ctx.states.save(&state).await?;
                        report.refreshed += 1;
                    }
                    None => {
                        close_state(&self.ctx, &state, None, "position no longer open").await;
                        report.closed += 1;
                    }
                }
            }
        }

        tracing::debug!(?report, "Position sync complete");
        Ok(report)
    }
}

fn find_position<'a>(positions: &'a [BrokerPosition], state: &PositionRiskState) -> Option<&'a BrokerPosition> {
    positions
        .iter()
        .find(|p| p.instrument_id == state.instrument_id && p.side == state.side && p.is_tracked())
}
