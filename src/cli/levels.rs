//! Levels command implementation

use super::SideArg;
use crate::config::Config;
use crate::risk::calculator::{stop_loss_hit, take_profit_hit};
use crate::risk::{recalculate, PositionRiskState, RiskDefaults, RiskKey, StateSource, TrailingType};
use chrono::Utc;
use clap::Args;
use rust_decimal::Decimal;

#[derive(Args, Debug)]
pub struct LevelsArgs {
    /// Position side
    #[arg(long, value_enum, default_value = "long")]
    pub side: SideArg,

    /// Average entry price
    #[arg(long)]
    pub avg: Decimal,

    /// Observed prices, applied in order
    #[arg(long = "price", required = true, num_args = 1..)]
    pub prices: Vec<Decimal>,

    /// Stop-loss fraction (defaults to config)
    #[arg(long)]
    pub sl: Option<Decimal>,

    /// Take-profit fraction (defaults to config)
    #[arg(long)]
    pub tp: Option<Decimal>,

    /// Trailing distance (defaults to config)
    #[arg(long)]
    pub trailing: Option<Decimal>,

    /// Average true range, for ATR trailing
    #[arg(long)]
    pub atr: Option<Decimal>,
}

impl LevelsArgs {
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let risk = &config.risk;
        let params = RiskDefaults {
            stop_loss_pct: self.sl.unwrap_or(risk.stop_loss_pct),
            take_profit_pct: self.tp.unwrap_or(risk.take_profit_pct),
            trailing_pct: self.trailing.unwrap_or(risk.trailing_pct),
            trailing_type: risk.trailing_type,
            min_step_ticks: risk.min_step_ticks,
            tick_size: risk.tick_size,
        };
        let key = RiskKey::new("cli", "INSTRUMENT", self.side.into());
        let mut state = PositionRiskState::open(&key, self.avg, 1, &params, StateSource::Manual, Utc::now());
        state.atr = self.atr;

        println!(
            "{} avg={} sl={} tp={} trailing={} {}",
            key.side,
            self.avg,
            params.stop_loss_pct,
            params.take_profit_pct,
            params.trailing_type,
            params.trailing_pct
        );
        if params.trailing_type == TrailingType::Atr && self.atr.is_none() {
            println!("  (ATR trailing without --atr: trailing disabled)");
        }
        println!("{:>12} {:>12} {:>12} {:>12}  trigger", "price", "watermark", "stop", "take");

        for price in &self.prices {
            let recalculation = recalculate(&state, *price, Utc::now())?;
            state = recalculation.state;
            let stop = state.stop_loss_level.unwrap_or(Decimal::ZERO);
            let take = state.take_profit_level.unwrap_or(Decimal::ZERO);
            let trigger = if stop_loss_hit(state.side, *price, stop) {
                "STOP-LOSS"
            } else if take_profit_hit(state.side, *price, take) {
                "TAKE-PROFIT"
            } else {
                ""
            };
            println!(
                "{:>12} {:>12} {:>12} {:>12}  {}",
                price,
                state.watermark().unwrap_or(Decimal::ZERO).round_dp(4),
                stop.round_dp(4),
                take.round_dp(4),
                trigger
            );
        }
        Ok(())
    }
}
