//! Capital sizing advisor
//!
//! Admissible lot count for a new entry given the portfolio tier, hard
//! position and sector ceilings, buying power and an optional ATR risk cap.
//! Also sizes the partial take-profit leg used by the watcher.

use crate::config::SizingConfig;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

/// An existing holding in the portfolio
#[derive(Debug, Clone)]
pub struct Holding {
    pub instrument_id: String,
    pub sector: Option<String>,
    /// Current market value
    pub value: Decimal,
}

/// Portfolio at the time of the sizing request
#[derive(Debug, Clone, Default)]
pub struct PortfolioSnapshot {
    pub total_value: Decimal,
    pub holdings: Vec<Holding>,
}

impl PortfolioSnapshot {
    fn instrument_exposure(&self, instrument_id: &str) -> Decimal {
        self.holdings
            .iter()
            .filter(|h| h.instrument_id == instrument_id)
            .map(|h| h.value)
            .sum()
    }

    fn sector_exposure(&self, sector: &str) -> Decimal {
        self.holdings
            .iter()
            .filter(|h| h.sector.as_deref() == Some(sector))
            .map(|h| h.value)
            .sum()
    }
}

/// A proposed entry
#[derive(Debug, Clone)]
pub struct SizingRequest {
    pub account_id: String,
    pub instrument_id: String,
    pub sector: Option<String>,
    pub price: Decimal,
    pub buying_power: Decimal,
    /// Units per lot
    pub lot_size: u64,
    /// Average true range, enables the ATR cap when configured
    pub atr: Option<Decimal>,
}

/// Sizing outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum SizingDecision {
    Blocked { reason: String },
    Approved { lots: u64, position_value: Decimal },
}

impl SizingDecision {
    fn blocked(reason: impl Into<String>) -> Self {
        SizingDecision::Blocked {
            reason: reason.into(),
        }
    }
}

/// Portfolio-aware position sizing
#[derive(Debug, Clone)]
pub struct CapitalSizingAdvisor {
    config: SizingConfig,
}

impl CapitalSizingAdvisor {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    /// Position-size fraction for the portfolio's tier
    pub fn tier_pct(&self, portfolio_value: Decimal) -> Decimal {
        if portfolio_value < self.config.small_portfolio_limit {
            self.config.small_tier_pct
        } else if portfolio_value < self.config.medium_portfolio_limit {
            self.config.medium_tier_pct
        } else {
            self.config.large_tier_pct
        }
    }

    /// Admissible size for a new entry
    pub fn advise(&self, request: &SizingRequest, portfolio: &PortfolioSnapshot) -> SizingDecision {
        let total = portfolio.total_value;
        if total <= Decimal::ZERO {
            return SizingDecision::blocked("portfolio value is zero");
        }
        if request.price <= Decimal::ZERO || request.lot_size == 0 {
            return SizingDecision::blocked(format!(
                "invalid price {} or lot size {}",
                request.price, request.lot_size
            ));
        }
        let Some(lot_value) = request.price.checked_mul(Decimal::from(request.lot_size)) else {
            return SizingDecision::blocked(format!(
                "lot value overflows at price {} and lot size {}",
                request.price, request.lot_size
            ));
        };

        let mut limits: Vec<(u64, String)> = Vec::new();

        let tier_pct = self.tier_pct(total);
        limits.push((
            lots_within(total * tier_pct, lot_value),
            format!("tier limit {}% of portfolio", tier_pct * Decimal::ONE_HUNDRED),
        ));

        let position_room = total * self.config.max_position_pct
            - portfolio.instrument_exposure(&request.instrument_id);
        limits.push((
            lots_within(position_room, lot_value),
            format!(
                "position ceiling {}% of portfolio reached for {}",
                self.config.max_position_pct * Decimal::ONE_HUNDRED,
                request.instrument_id
            ),
        ));

        if let Some(sector) = request.sector.as_deref() {
            let sector_room = total * self.config.max_sector_pct - portfolio.sector_exposure(sector);
            limits.push((
                lots_within(sector_room, lot_value),
                format!(
                    "sector {} exposure ceiling {}% reached",
                    sector,
                    self.config.max_sector_pct * Decimal::ONE_HUNDRED
                ),
            ));
        }

        limits.push((
            lots_within(request.buying_power, lot_value),
            format!("insufficient buying power {}", request.buying_power),
        ));

        if let (Some(risk_pct), Some(atr)) = (self.config.atr_risk_pct, request.atr) {
            let risk_per_lot = atr
                .checked_mul(self.config.atr_multiplier)
                .and_then(|r| r.checked_mul(Decimal::from(request.lot_size)));
            let reason = format!("ATR risk cap {}% of portfolio", risk_pct * Decimal::ONE_HUNDRED);
            match risk_per_lot {
                Some(risk) if risk > Decimal::ZERO => {
                    limits.push((lots_within(total * risk_pct, risk), reason));
                }
                Some(_) => {}
                None => limits.push((0, reason)),
            }
        }

        let Some((lots, reason)) = limits.into_iter().min_by_key(|(lots, _)| *lots) else {
            return SizingDecision::blocked("no sizing limits");
        };
        if lots == 0 {
            tracing::debug!(
                account = %request.account_id,
                instrument = %request.instrument_id,
                reason = %reason,
                "Entry blocked by sizing"
            );
            return SizingDecision::Blocked { reason };
        }

        match lot_value.checked_mul(Decimal::from(lots)) {
            Some(position_value) => SizingDecision::Approved {
                lots,
                position_value,
            },
            None => SizingDecision::blocked(format!("position value overflows at {lots} lots")),
        }
    }

    /// Lots closed by a first-stage take-profit: half, rounded down, at least one
    pub fn partial_exit_lots(&self, quantity: u64) -> u64 {
        if quantity == 0 {
            return 0;
        }
        (quantity / 2).max(1)
    }
}

/// Whole lots affordable within `budget`; saturates when the quotient exceeds `u64`
fn lots_within(budget: Decimal, per_lot: Decimal) -> u64 {
    if budget <= Decimal::ZERO || per_lot <= Decimal::ZERO {
        return 0;
    }
    match budget.checked_div(per_lot) {
        Some(lots) => lots.floor().to_u64().unwrap_or(u64::MAX),
        None => u64::MAX,
    }
}
