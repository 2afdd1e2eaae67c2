//! Risk level calculator
//!
//! Pure state transition: given a position risk state and the current price,
//! produce the next state (watermark, stop-loss, take-profit) and the audit
//! events describing what changed. No I/O happens here.

use super::{PositionRiskState, RiskError, RiskEvent, RiskEventType, TrailingType};
use crate::broker::PositionSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Result of one recalculation
#[derive(Debug, Clone)]
pub struct Recalculation {
    /// Next state
    pub state: PositionRiskState,
    /// Events describing every change, in order
    pub events: Vec<RiskEvent>,
}

impl Recalculation {
    /// Whether anything changed
    pub fn changed(&self) -> bool {
        !self.events.is_empty()
    }
}

/// Base stop-loss level from the average price
pub fn base_stop_loss(side: PositionSide, average_price: Decimal, stop_loss_pct: Decimal) -> Decimal {
    match side {
        PositionSide::Long => average_price * (Decimal::ONE - stop_loss_pct),
        PositionSide::Short => average_price * (Decimal::ONE + stop_loss_pct),
    }
}

/// Take-profit level from the average price
pub fn take_profit_level(
    side: PositionSide,
    average_price: Decimal,
    take_profit_pct: Decimal,
) -> Decimal {
    match side {
        PositionSide::Long => average_price * (Decimal::ONE + take_profit_pct),
        PositionSide::Short => average_price * (Decimal::ONE - take_profit_pct),
    }
}

/// Whether the price has breached a stop-loss level
pub fn stop_loss_hit(side: PositionSide, price: Decimal, level: Decimal) -> bool {
    match side {
        PositionSide::Long => price <= level,
        PositionSide::Short => price >= level,
    }
}

/// Whether the price has reached a take-profit level
pub fn take_profit_hit(side: PositionSide, price: Decimal, level: Decimal) -> bool {
    match side {
        PositionSide::Long => price >= level,
        PositionSide::Short => price <= level,
    }
}

/// Whether `candidate` is a tighter (more protective) stop than `current`
fn is_tighter(side: PositionSide, candidate: Decimal, current: Decimal) -> bool {
    match side {
        PositionSide::Long => candidate > current,
        PositionSide::Short => candidate < current,
    }
}

fn tighter(side: PositionSide, a: Decimal, b: Decimal) -> Decimal {
    if is_tighter(side, a, b) {
        a
    } else {
        b
    }
}

/// Trailing stop candidate anchored at the watermark, if trailing applies
fn trailing_candidate(state: &PositionRiskState, watermark: Decimal, base: Decimal) -> Option<Decimal> {
    if state.trailing_pct <= Decimal::ZERO {
        return None;
    }
    let pct = state.trailing_pct;
    let offset = match state.trailing_type {
        TrailingType::Percent => watermark * pct,
        TrailingType::Fixed => pct,
        TrailingType::Atr => state.atr? * pct,
        TrailingType::Channel => {
            // Base stop shifted by a share of the favorable move
            let favorable = (watermark - state.average_price_snapshot).abs();
            return Some(match state.side {
                PositionSide::Long => base + favorable * pct,
                PositionSide::Short => base - favorable * pct,
            });
        }
    };
    Some(match state.side {
        PositionSide::Long => watermark - offset,
        PositionSide::Short => watermark + offset,
    })
}

/// Keep the stop on the loss side of the average price
fn cap_at_break_even(side: PositionSide, level: Decimal, average_price: Decimal) -> Decimal {
    match side {
        PositionSide::Long => level.min(average_price),
        PositionSide::Short => level.max(average_price),
    }
}

/// Recalculate watermark, stop-loss and take-profit for the current price
pub fn recalculate(
    state: &PositionRiskState,
    price: Decimal,
    now: DateTime<Utc>,
) -> Result<Recalculation, RiskError> {
    if price <= Decimal::ZERO {
        return Err(RiskError::InvalidPrice(price));
    }
    let average = state.average_price_snapshot;
    if average <= Decimal::ZERO {
        return Err(RiskError::MissingAveragePrice(state.key().to_string()));
    }

    let side = state.side;
    let mut next = state.clone();
    let mut events = Vec::new();

    // Watermark never retreats
    let old_watermark = state.watermark();
    let anchor = old_watermark.unwrap_or(state.entry_price);
    let watermark = match side {
        PositionSide::Long => anchor.max(price),
        PositionSide::Short => anchor.min(price),
    };
    if old_watermark != Some(watermark) {
        match side {
            PositionSide::Long => next.high_watermark = Some(watermark),
            PositionSide::Short => next.low_watermark = Some(watermark),
        }
        events.push(
            RiskEvent::new(
                &state.account_id,
                &state.instrument_id,
                RiskEventType::WatermarkUpdated,
                "new favorable extreme",
                now,
            )
            .with_values(old_watermark, Some(watermark))
            .with_price(price, Some(watermark)),
        );
    }

    // Stop-loss: base level, ratcheted by the trailing stop once active
    let base = base_stop_loss(side, average, state.stop_loss_pct);
    let floor = match (state.trailing_active, state.stop_loss_level) {
        (true, Some(previous)) => tighter(side, previous, base),
        _ => base,
    };

    let at_extreme = match side {
        PositionSide::Long => price >= watermark,
        PositionSide::Short => price <= watermark,
    };
    let mut stop = floor;
    let mut trailed = false;
    if at_extreme {
        if let Some(candidate) = trailing_candidate(state, watermark, base) {
            let candidate = cap_at_break_even(side, candidate, average);
            let min_step = state.tick_size * Decimal::from(state.min_step_ticks);
            if is_tighter(side, candidate, floor) && (candidate - floor).abs() >= min_step {
                stop = candidate;
                trailed = true;
            }
        }
    }
    next.trailing_active = state.trailing_active || trailed;

    if state.stop_loss_level != Some(stop) {
        let (event_type, reason) = if trailed {
            (RiskEventType::TrailingUpdated, "trailing stop tightened")
        } else {
            (RiskEventType::SlUpdated, "stop-loss recalculated")
        };
        next.stop_loss_level = Some(stop);
        events.push(
            RiskEvent::new(&state.account_id, &state.instrument_id, event_type, reason, now)
                .with_values(state.stop_loss_level, Some(stop))
                .with_price(price, Some(watermark))
                .with_details(format!(
                    "sl_pct={} trailing={} {}",
                    state.stop_loss_pct, state.trailing_type, state.trailing_pct
                )),
        );
    }

    let take = take_profit_level(side, average, state.take_profit_pct);
    if state.take_profit_level != Some(take) {
        next.take_profit_level = Some(take);
        events.push(
            RiskEvent::new(
                &state.account_id,
                &state.instrument_id,
                RiskEventType::TpUpdated,
                "take-profit recalculated",
                now,
            )
            .with_values(state.take_profit_level, Some(take))
            .with_price(price, Some(watermark))
            .with_details(format!("tp_pct={}", state.take_profit_pct)),
        );
    }

    if !events.is_empty() {
        next.updated_at = now;
    }

    Ok(Recalculation { state: next, events })
}
