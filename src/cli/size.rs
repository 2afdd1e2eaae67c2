//! Size command implementation

use crate::config::Config;
use crate::risk::{CapitalSizingAdvisor, Holding, PortfolioSnapshot, SizingRequest};
use clap::Args;
use rust_decimal::Decimal;

#[derive(Args, Debug)]
pub struct SizeArgs {
    /// Instrument to enter
    #[arg(long)]
    pub instrument: String,

    /// Entry price per unit
    #[arg(long)]
    pub price: Decimal,

    /// Total portfolio value
    #[arg(long)]
    pub portfolio: Decimal,

    /// Available buying power (defaults to portfolio value)
    #[arg(long)]
    pub buying_power: Option<Decimal>,

    /// Units per lot
    #[arg(long, default_value_t = 1)]
    pub lot_size: u64,

    /// Sector of the instrument
    #[arg(long)]
    pub sector: Option<String>,

    /// Current value already held in the same sector
    #[arg(long)]
    pub sector_exposure: Option<Decimal>,

    /// Average true range
    #[arg(long)]
    pub atr: Option<Decimal>,
}

impl SizeArgs {
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let advisor = CapitalSizingAdvisor::new(config.sizing.clone());
        let mut portfolio = PortfolioSnapshot {
            total_value: self.portfolio,
            holdings: Vec::new(),
        };
        if let (Some(sector), Some(value)) = (&self.sector, self.sector_exposure) {
            portfolio.holdings.push(Holding {
                instrument_id: format!("{sector}-holdings"),
                sector: Some(sector.clone()),
                value,
            });
        }

        let request = SizingRequest {
            account_id: "cli".to_string(),
            instrument_id: self.instrument.clone(),
            sector: self.sector.clone(),
            price: self.price,
            buying_power: self.buying_power.unwrap_or(self.portfolio),
            lot_size: self.lot_size,
            atr: self.atr,
        };
        let decision = advisor.advise(&request, &portfolio);
        println!("{}", serde_json::to_string_pretty(&decision)?);
        Ok(())
    }
}
