//! Stop-loss and two-stage take-profit handling shared by the watcher and the sweep

use super::RiskContext;
use crate::execution::ExitOutcome;
use crate::risk::calculator::{stop_loss_hit, take_profit_hit};
use crate::risk::{PositionRiskState, RiskEvent, RiskEventType};
use crate::telemetry::{increment, CounterMetric};
use chrono::Utc;
use rust_decimal::Decimal;

/// What happened to a position on this pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    NotTriggered,
    StopLoss { lots: u64 },
    PartialTakeProfit { lots: u64 },
    FinalTakeProfit { lots: u64 },
    /// Exit refused by the cooldown guard
    Blocked,
    /// Exit attempt failed; retried next pass
    Failed,
}

/// Evaluate the stored levels at `price` and submit an exit on a breach
pub(crate) async fn handle_triggers(
    ctx: &RiskContext,
    state: &PositionRiskState,
    quantity: u64,
    price: Decimal,
) -> TriggerOutcome {
    if quantity == 0 {
        return TriggerOutcome::NotTriggered;
    }
    let side = state.side;

    if let Some(stop) = state.stop_loss_level {
        if stop_loss_hit(side, price, stop) {
            increment(CounterMetric::StopLossTriggered, 1);
            tracing::warn!(
                key = %state.key(),
                %price,
                %stop,
                quantity,
                "Stop-loss triggered"
            );
            return match submit(ctx, state, quantity, "stop-loss").await {
                Some(true) => {
                    close_state(ctx, state, Some(price), "stop-loss executed").await;
                    TriggerOutcome::StopLoss { lots: quantity }
                }
                Some(false) => TriggerOutcome::Blocked,
                None => TriggerOutcome::Failed,
            };
        }
    }

    let Some(take) = state.take_profit_level else {
        return TriggerOutcome::NotTriggered;
    };
    if !take_profit_hit(side, price, take) {
        return TriggerOutcome::NotTriggered;
    }
    increment(CounterMetric::TakeProfitTriggered, 1);

    let stage = match ctx.stages.get(&state.account_id, &state.instrument_id).await {
        Ok(stage) => stage,
        Err(e) => {
            tracing::warn!(key = %state.key(), error = %e, "Stage lookup failed");
            return TriggerOutcome::Failed;
        }
    };

    let partial = ctx.sizing.partial_exit_lots(quantity);
    if stage == 0 && partial < quantity {
        tracing::info!(key = %state.key(), %price, %take, lots = partial, "Take-profit stage 1");
        return match submit(ctx, state, partial, "take-profit stage 1").await {
            Some(true) => {
                if let Err(e) = ctx
                    .stages
                    .set(&state.account_id, &state.instrument_id, 1)
                    .await
                {
                    tracing::error!(key = %state.key(), error = %e, "Failed to record take-profit stage");
                }
                let mut remaining = state.clone();
                remaining.quantity_snapshot = quantity - partial;
                remaining.updated_at = Utc::now();
                if let Err(e) = ctx.states.save(&remaining).await {
                    tracing::error!(key = %state.key(), error = %e, "Failed to record remaining quantity");
                }
                TriggerOutcome::PartialTakeProfit { lots: partial }
            }
            Some(false) => TriggerOutcome::Blocked,
            None => TriggerOutcome::Failed,
        };
    }

    tracing::info!(key = %state.key(), %price, %take, lots = quantity, stage, "Take-profit final");
    match submit(ctx, state, quantity, "take-profit final").await {
        Some(true) => {
            close_state(ctx, state, Some(price), "take-profit executed").await;
            TriggerOutcome::FinalTakeProfit { lots: quantity }
        }
        Some(false) => TriggerOutcome::Blocked,
        None => TriggerOutcome::Failed,
    }
}

/// Some(true) when submitted, Some(false) when blocked, None on failure
async fn submit(ctx: &RiskContext, state: &PositionRiskState, lots: u64, reason: &str) -> Option<bool> {
    match ctx
        .exits
        .submit(
            &state.account_id,
            &state.instrument_id,
            state.side.exit_direction(),
            lots,
            reason,
        )
        .await
    {
        Ok(ExitOutcome::Submitted(_)) => Some(true),
        Ok(ExitOutcome::Blocked { .. }) => Some(false),
        Err(e) => {
            tracing::error!(key = %state.key(), error = %e, reason, "Exit failed");
            None
        }
    }
}

/// Delete the risk state, reset the stage flag and record the close
pub(crate) async fn close_state(
    ctx: &RiskContext,
    state: &PositionRiskState,
    price: Option<Decimal>,
    reason: &str,
) {
    let key = state.key();
    if let Err(e) = ctx.states.delete(&key).await {
        tracing::error!(key = %key, error = %e, "Failed to delete risk state");
        return;
    }
    if let Err(e) = ctx.stages.clear(&state.account_id, &state.instrument_id).await {
        tracing::warn!(key = %key, error = %e, "Failed to clear take-profit stage");
    }

    let mut event = RiskEvent::new(
        &state.account_id,
        &state.instrument_id,
        RiskEventType::PositionClosed,
        reason,
        Utc::now(),
    )
    .with_values(state.stop_loss_level, None)
    .with_details(format!("quantity={}", state.quantity_snapshot));
    if let Some(price) = price {
        event = event.with_price(price, state.watermark());
    }
    ctx.record_events(&[event]).await;
    tracing::info!(key = %key, reason, "Risk state closed");
}
