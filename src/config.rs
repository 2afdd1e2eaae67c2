//! Configuration types for position-guard

use crate::broker::{InstrumentKind, PositionSide};
use crate::risk::TrailingType;
use crate::telemetry::LogFormat;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cooldown: CooldownConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub paper: PaperConfig,
}

/// Monitoring loop schedule
#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    /// Position watcher interval (seconds)
    #[serde(default = "default_watcher_interval")]
    pub watcher_interval_secs: u64,

    /// Virtual order / OCO monitor interval (seconds)
    #[serde(default = "default_oco_interval")]
    pub oco_interval_secs: u64,

    /// Stored-level SL/TP sweep interval (seconds)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Position-to-storage sync interval (seconds)
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// Engage the panic stop before the first pass
    #[serde(default)]
    pub start_paused: bool,
}

fn default_watcher_interval() -> u64 {
    15
}
fn default_oco_interval() -> u64 {
    30
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_sync_interval() -> u64 {
    60
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            watcher_interval_secs: 15,
            oco_interval_secs: 30,
            sweep_interval_secs: 60,
            sync_interval_secs: 60,
            start_paused: false,
        }
    }
}

/// Global risk defaults, used when an instrument has no active rule
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,

    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: Decimal,

    /// Zero disables trailing
    #[serde(default = "default_trailing_pct")]
    pub trailing_pct: Decimal,

    #[serde(default)]
    pub trailing_type: TrailingType,

    #[serde(default)]
    pub min_step_ticks: u32,

    #[serde(default = "default_tick_size")]
    pub tick_size: Decimal,
}

fn default_stop_loss_pct() -> Decimal {
    Decimal::new(2, 2) // 0.02 = 2%
}
fn default_take_profit_pct() -> Decimal {
    Decimal::new(6, 2) // 0.06 = 6%
}
fn default_trailing_pct() -> Decimal {
    Decimal::new(15, 3) // 0.015 = 1.5%
}
fn default_tick_size() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            trailing_pct: default_trailing_pct(),
            trailing_type: TrailingType::Percent,
            min_step_ticks: 0,
            tick_size: default_tick_size(),
        }
    }
}

/// Order submission throttle
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_orders_per_minute")]
    pub orders_per_minute: u32,

    /// Fixed delay when the window is exhausted (milliseconds)
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_orders_per_minute() -> u32 {
    30
}
fn default_backoff_ms() -> u64 {
    1000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            orders_per_minute: 30,
            backoff_ms: 1000,
        }
    }
}

/// Per-instrument re-trade cooldown
#[derive(Debug, Clone, Deserialize)]
pub struct CooldownConfig {
    /// How far back filled orders are inspected
    #[serde(default = "default_lookback_minutes")]
    pub lookback_minutes: i64,

    /// Follow-up after a single fresh fill
    #[serde(default = "default_first_trade_minutes")]
    pub first_trade_minutes: i64,

    /// Repeat in the same direction
    #[serde(default = "default_same_direction_minutes")]
    pub same_direction_minutes: i64,

    /// Direction reversal
    #[serde(default = "default_reversal_minutes")]
    pub reversal_minutes: i64,
}

fn default_lookback_minutes() -> i64 {
    120
}
fn default_first_trade_minutes() -> i64 {
    15
}
fn default_same_direction_minutes() -> i64 {
    30
}
fn default_reversal_minutes() -> i64 {
    60
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            lookback_minutes: 120,
            first_trade_minutes: 15,
            same_direction_minutes: 30,
            reversal_minutes: 60,
        }
    }
}

/// Capital sizing advisor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SizingConfig {
    /// Portfolios below this value use the small tier
    #[serde(default = "default_small_portfolio_limit")]
    pub small_portfolio_limit: Decimal,

    /// Portfolios below this value (and above small) use the medium tier
    #[serde(default = "default_medium_portfolio_limit")]
    pub medium_portfolio_limit: Decimal,

    #[serde(default = "default_small_tier_pct")]
    pub small_tier_pct: Decimal,

    #[serde(default = "default_medium_tier_pct")]
    pub medium_tier_pct: Decimal,

    #[serde(default = "default_large_tier_pct")]
    pub large_tier_pct: Decimal,

    /// Hard ceiling on one position's value
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: Decimal,

    /// Ceiling on one sector's total value
    #[serde(default = "default_max_sector_pct")]
    pub max_sector_pct: Decimal,

    /// Portfolio fraction a full stop distance may cost; unset disables the ATR cap
    #[serde(default)]
    pub atr_risk_pct: Option<Decimal>,

    /// Stop distance in ATRs
    #[serde(default = "default_atr_multiplier")]
    pub atr_multiplier: Decimal,
}

fn default_small_portfolio_limit() -> Decimal {
    Decimal::new(100_000, 0)
}
fn default_medium_portfolio_limit() -> Decimal {
    Decimal::new(1_000_000, 0)
}
fn default_small_tier_pct() -> Decimal {
    Decimal::new(10, 2) // 10%
}
fn default_medium_tier_pct() -> Decimal {
    Decimal::new(7, 2) // 7%
}
fn default_large_tier_pct() -> Decimal {
    Decimal::new(5, 2) // 5%
}
fn default_max_position_pct() -> Decimal {
    Decimal::new(15, 2) // 15%
}
fn default_max_sector_pct() -> Decimal {
    Decimal::new(30, 2) // 30%
}
fn default_atr_multiplier() -> Decimal {
    Decimal::new(2, 0)
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            small_portfolio_limit: default_small_portfolio_limit(),
            medium_portfolio_limit: default_medium_portfolio_limit(),
            small_tier_pct: default_small_tier_pct(),
            medium_tier_pct: default_medium_tier_pct(),
            large_tier_pct: default_large_tier_pct(),
            max_position_pct: default_max_position_pct(),
            max_sector_pct: default_max_sector_pct(),
            atr_risk_pct: None,
            atr_multiplier: default_atr_multiplier(),
        }
    }
}

/// Risk event journal
#[derive(Debug, Clone, Deserialize, Default)]
pub struct JournalConfig {
    /// Append risk events as JSON lines to this file
    pub path: Option<PathBuf>,
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Serve Prometheus metrics on this port
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

/// Paper broker seed data
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PaperConfig {
    #[serde(default)]
    pub accounts: Vec<PaperAccountConfig>,

    /// Starting prices by instrument
    #[serde(default)]
    pub prices: HashMap<String, Decimal>,
}

/// One paper account and its starting positions
#[derive(Debug, Clone, Deserialize)]
pub struct PaperAccountConfig {
    pub id: String,
    #[serde(default)]
    pub positions: Vec<PaperPositionConfig>,
}

/// A starting paper position
#[derive(Debug, Clone, Deserialize)]
pub struct PaperPositionConfig {
    pub instrument_id: String,
    pub side: PositionSide,
    pub quantity: u64,
    pub average_price: Decimal,
    #[serde(default)]
    pub kind: InstrumentKind,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
