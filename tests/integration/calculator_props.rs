//! Property tests for the risk level calculator.
//!
//! Over random price paths, for both sides and every trailing type:
//! 1. The watermark never retreats
//! 2. The stop-loss never loosens
//! 3. The stop-loss stays on the loss side of the average price
//! 4. Repeating the last price changes nothing

use chrono::Utc;
use position_guard::broker::PositionSide;
use position_guard::risk::{
    recalculate, PositionRiskState, RiskDefaults, RiskKey, StateSource, TrailingType,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

// ── Strategies ───────────────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = Decimal> {
    (1000i64..50000).prop_map(|cents| Decimal::new(cents, 2))
}

fn arb_side() -> impl Strategy<Value = PositionSide> {
    prop_oneof![Just(PositionSide::Long), Just(PositionSide::Short)]
}

fn arb_trailing_type() -> impl Strategy<Value = TrailingType> {
    prop_oneof![
        Just(TrailingType::Percent),
        Just(TrailingType::Atr),
        Just(TrailingType::Fixed),
        Just(TrailingType::Channel),
    ]
}

/// A fresh state with random parameters
fn arb_state() -> impl Strategy<Value = PositionRiskState> {
    (
        arb_side(),
        arb_price(),
        1i64..=20,
        arb_trailing_type(),
        1i64..=200,
        0u32..=10,
        1i64..=1000,
    )
        .prop_map(|(side, average, sl, trailing_type, trail, min_step_ticks, atr)| {
            let trailing_pct = match trailing_type {
                // Absolute distance, 0.1 to 20.0
                TrailingType::Fixed => Decimal::new(trail, 1),
                // 0.1% to 20%
                _ => Decimal::new(trail, 3),
            };
            let params = RiskDefaults {
                stop_loss_pct: Decimal::new(sl, 2),
                take_profit_pct: Decimal::new(6, 2),
                trailing_pct,
                trailing_type,
                min_step_ticks,
                tick_size: Decimal::new(1, 2),
            };
            let key = RiskKey::new("acc-1", "SBER", side);
            let mut state =
                PositionRiskState::open(&key, average, 10, &params, StateSource::Defaults, Utc::now());
            state.atr = Some(Decimal::new(atr, 2));
            state
        })
}

fn is_looser(side: PositionSide, next: Decimal, previous: Decimal) -> bool {
    match side {
        PositionSide::Long => next < previous,
        PositionSide::Short => next > previous,
    }
}

// ── Properties ───────────────────────────────────────────────────────

proptest! {
    /// Watermark moves only in the favorable direction.
    #[test]
    fn watermark_never_retreats(
        state in arb_state(),
        prices in prop::collection::vec(arb_price(), 1..40),
    ) {
        let mut state = state;
        let mut previous = None;
        for price in prices {
            state = recalculate(&state, price, Utc::now()).unwrap().state;
            let watermark = state.watermark().unwrap();
            if let Some(previous) = previous {
                match state.side {
                    PositionSide::Long => prop_assert!(watermark >= previous, "{watermark} < {previous}"),
                    PositionSide::Short => prop_assert!(watermark <= previous, "{watermark} > {previous}"),
                }
            }
            previous = Some(watermark);
        }
    }

    /// Once set, the stop only tightens, and trailing never deactivates.
    #[test]
    fn stop_never_loosens(
        state in arb_state(),
        prices in prop::collection::vec(arb_price(), 1..40),
    ) {
        let mut state = state;
        for price in prices {
            let next = recalculate(&state, price, Utc::now()).unwrap().state;
            if let (Some(before), Some(after)) = (state.stop_loss_level, next.stop_loss_level) {
                prop_assert!(
                    !is_looser(state.side, after, before),
                    "{:?} {} stop loosened from {before} to {after} at {price}",
                    state.side,
                    state.trailing_type
                );
            }
            prop_assert!(!state.trailing_active || next.trailing_active);
            state = next;
        }
    }

    /// The stop never crosses to the profit side of the average price.
    #[test]
    fn stop_stays_on_loss_side(
        state in arb_state(),
        prices in prop::collection::vec(arb_price(), 1..40),
    ) {
        let mut state = state;
        let average = state.average_price_snapshot;
        for price in prices {
            state = recalculate(&state, price, Utc::now()).unwrap().state;
            let stop = state.stop_loss_level.unwrap();
            match state.side {
                PositionSide::Long => prop_assert!(stop <= average, "long stop {stop} above {average}"),
                PositionSide::Short => prop_assert!(stop >= average, "short stop {stop} below {average}"),
            }
        }
    }

    /// Recalculating at the same price is a no-op.
    #[test]
    fn repeated_price_emits_no_events(
        state in arb_state(),
        prices in prop::collection::vec(arb_price(), 1..20),
    ) {
        let mut state = state;
        for price in &prices {
            state = recalculate(&state, *price, Utc::now()).unwrap().state;
        }
        let last = *prices.last().unwrap();
        let again = recalculate(&state, last, Utc::now()).unwrap();
        prop_assert!(!again.changed(), "{:?}", again.events);
        prop_assert_eq!(again.state.stop_loss_level, state.stop_loss_level);
    }
}
