//! Execution module
//!
//! Order records, the exit path (cooldown, rate limit, broker) and OCO coordination

mod cooldown;
mod exit;
mod oco;
mod panic;
mod rate_limit;
mod store;
mod types;

pub use cooldown::{evaluate as evaluate_cooldown, CooldownDecision, CooldownGuard, CooldownPolicy, TradeRelation};
pub use exit::{ExitExecutor, ExitOutcome};
pub use oco::{OcoCoordinator, OcoTickReport};
pub use panic::PanicSwitch;
pub use rate_limit::{Permit, RateLimiter};
pub use store::{Claim, InMemoryOrderStore, OrderStore};
pub use types::{parse_oco_group, ExecutionError, Order, OrderId, OrderKind, OrderStatus};
