//! position-guard: stop-loss, take-profit and OCO guard for brokerage positions
//!
//! This library provides the core components for:
//! - Per-position risk state with trailing stops and an audit event log
//! - Periodic position watcher, SL/TP sweep and position sync loops
//! - Virtual protective orders with one-cancels-other coordination
//! - Rate limiting and re-trade cooldown on the exit path
//! - Portfolio-aware capital sizing
//! - Paper broker and static price feed
//! - Full observability stack

pub mod broker;
pub mod cli;
pub mod config;
pub mod engine;
pub mod execution;
pub mod market;
pub mod risk;
pub mod settings;
pub mod telemetry;
pub mod watcher;
