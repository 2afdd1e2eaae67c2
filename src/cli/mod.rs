//! CLI interface for position-guard
//!
//! Provides subcommands for:
//! - `run`: Start the monitoring loops against the paper broker
//! - `levels`: Show calculator output for a hypothetical position
//! - `size`: Ask the sizing advisor for an entry size
//! - `config`: Show the effective configuration

mod levels;
mod run;
mod size;

pub use levels::LevelsArgs;
pub use run::{build_paper_engine, RunArgs};
pub use size::SizeArgs;

use clap::{Parser, Subcommand, ValueEnum};

use crate::broker::PositionSide;

#[derive(Parser, Debug)]
#[command(name = "position-guard")]
#[command(about = "Stop-loss, take-profit and OCO guard for open brokerage positions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the monitoring loops
    Run(RunArgs),
    /// Show stop/take levels for a hypothetical position
    Levels(LevelsArgs),
    /// Size a new entry
    Size(SizeArgs),
    /// Show configuration
    Config,
}

/// Position side as a CLI value
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SideArg {
    Long,
    Short,
}

impl From<SideArg> for PositionSide {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Long => PositionSide::Long,
            SideArg::Short => PositionSide::Short,
        }
    }
}
