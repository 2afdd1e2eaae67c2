//! Runtime settings store
//!
//! Key-value lookups with defaults. Seeded from the TOML config at startup and
//! read live by rule resolution, cooldown checks and rate limiting, so values
//! can be changed while the loops run.

use crate::config::Config;
use crate::risk::{RiskDefaults, TrailingType};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;

/// Well-known setting keys
pub mod keys {
    pub const DEFAULT_STOP_LOSS_PCT: &str = "risk.default_stop_loss_pct";
    pub const DEFAULT_TAKE_PROFIT_PCT: &str = "risk.default_take_profit_pct";
    pub const DEFAULT_TRAILING_PCT: &str = "risk.default_trailing_pct";
    pub const DEFAULT_TRAILING_TYPE: &str = "risk.default_trailing_type";
    pub const MIN_STEP_TICKS: &str = "risk.min_step_ticks";
    pub const TICK_SIZE: &str = "risk.tick_size";
    pub const ORDERS_PER_MINUTE: &str = "rate_limit.orders_per_minute";
    pub const RATE_LIMIT_BACKOFF_MS: &str = "rate_limit.backoff_ms";
    pub const COOLDOWN_LOOKBACK_MINUTES: &str = "cooldown.lookback_minutes";
    pub const COOLDOWN_FIRST_TRADE_MINUTES: &str = "cooldown.first_trade_minutes";
    pub const COOLDOWN_SAME_DIRECTION_MINUTES: &str = "cooldown.same_direction_minutes";
    pub const COOLDOWN_REVERSAL_MINUTES: &str = "cooldown.reversal_minutes";
}

/// Trait for settings lookups
pub trait SettingsStore: Send + Sync {
    /// Raw value for a key
    fn get(&self, key: &str) -> Option<String>;

    /// Set a value
    fn set(&self, key: &str, value: String);

    fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn get_int(&self, key: &str, default: i64) -> i64 {
        parse_or(self.get(key), key, default)
    }

    fn get_decimal(&self, key: &str, default: Decimal) -> Decimal {
        parse_or(self.get(key), key, default)
    }
}

fn parse_or<T: FromStr + Copy>(raw: Option<String>, key: &str, default: T) -> T {
    match raw {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %value, "Unparseable setting, using default");
            default
        }),
        None => default,
    }
}

/// Settings held in memory
#[derive(Default)]
pub struct InMemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed settings from the loaded configuration
    pub fn from_config(config: &Config) -> Self {
        let settings = Self::new();
        let risk = &config.risk;
        settings.set(keys::DEFAULT_STOP_LOSS_PCT, risk.stop_loss_pct.to_string());
        settings.set(keys::DEFAULT_TAKE_PROFIT_PCT, risk.take_profit_pct.to_string());
        settings.set(keys::DEFAULT_TRAILING_PCT, risk.trailing_pct.to_string());
        settings.set(keys::DEFAULT_TRAILING_TYPE, risk.trailing_type.to_string());
        settings.set(keys::MIN_STEP_TICKS, risk.min_step_ticks.to_string());
        settings.set(keys::TICK_SIZE, risk.tick_size.to_string());

        let limit = &config.rate_limit;
        settings.set(keys::ORDERS_PER_MINUTE, limit.orders_per_minute.to_string());
        settings.set(keys::RATE_LIMIT_BACKOFF_MS, limit.backoff_ms.to_string());

        let cooldown = &config.cooldown;
        settings.set(keys::COOLDOWN_LOOKBACK_MINUTES, cooldown.lookback_minutes.to_string());
        settings.set(
            keys::COOLDOWN_FIRST_TRADE_MINUTES,
            cooldown.first_trade_minutes.to_string(),
        );
        settings.set(
            keys::COOLDOWN_SAME_DIRECTION_MINUTES,
            cooldown.same_direction_minutes.to_string(),
        );
        settings.set(
            keys::COOLDOWN_REVERSAL_MINUTES,
            cooldown.reversal_minutes.to_string(),
        );
        settings
    }
}

impl SettingsStore for InMemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value);
    }
}

fn parse_trailing_type(raw: &str) -> Option<TrailingType> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "PERCENT" => Some(TrailingType::Percent),
        "ATR" => Some(TrailingType::Atr),
        "FIXED" => Some(TrailingType::Fixed),
        "CHANNEL" => Some(TrailingType::Channel),
        _ => None,
    }
}

/// Resolve the global risk defaults from settings
pub fn risk_defaults(settings: &dyn SettingsStore) -> RiskDefaults {
    let fallback = crate::config::RiskConfig::default();
    let trailing_type = settings
        .get(keys::DEFAULT_TRAILING_TYPE)
        .and_then(|raw| parse_trailing_type(&raw))
        .unwrap_or(fallback.trailing_type);
    RiskDefaults {
        stop_loss_pct: settings.get_decimal(keys::DEFAULT_STOP_LOSS_PCT, fallback.stop_loss_pct),
        take_profit_pct: settings
            .get_decimal(keys::DEFAULT_TAKE_PROFIT_PCT, fallback.take_profit_pct),
        trailing_pct: settings.get_decimal(keys::DEFAULT_TRAILING_PCT, fallback.trailing_pct),
        trailing_type,
        min_step_ticks: settings
            .get_int(keys::MIN_STEP_TICKS, i64::from(fallback.min_step_ticks))
            .clamp(0, i64::from(u32::MAX)) as u32,
        tick_size: settings.get_decimal(keys::TICK_SIZE, fallback.tick_size),
    }
}
