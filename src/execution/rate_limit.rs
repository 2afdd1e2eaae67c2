//! Order submission rate limiter
//!
//! Permits are spread evenly across the minute (`60000 ms / limit` apart) and
//! counted per one-minute window. Both counters are atomics updated with
//! compare-and-swap, so one limiter is shared by every task that submits.

use crate::settings::{keys, SettingsStore};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

const WINDOW_MS: u64 = 60_000;

/// Outcome of a non-blocking acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    Granted,
    /// Next evenly spaced slot is this far away
    Wait(Duration),
    /// Window is full; back off and retry
    Exhausted,
}

/// Per-minute order throttle
pub struct RateLimiter {
    origin: Instant,
    orders_per_minute: AtomicU32,
    backoff_ms: AtomicU64,
    next_slot_ms: AtomicU64,
    /// Window index in the high 32 bits, permits granted in the low 32
    window: AtomicU64,
}

fn pack(window: u64, count: u64) -> u64 {
    (window << 32) | (count & 0xFFFF_FFFF)
}

fn unpack(packed: u64) -> (u64, u64) {
    (packed >> 32, packed & 0xFFFF_FFFF)
}

impl RateLimiter {
    pub fn new(orders_per_minute: u32, backoff: Duration) -> Self {
        Self {
            origin: Instant::now(),
            orders_per_minute: AtomicU32::new(orders_per_minute.max(1)),
            backoff_ms: AtomicU64::new(backoff.as_millis() as u64),
            next_slot_ms: AtomicU64::new(0),
            window: AtomicU64::new(pack(0, 0)),
        }
    }

    /// Re-read limit and backoff from live settings
    pub fn configure(&self, settings: &dyn SettingsStore) {
        let limit = settings.get_int(
            keys::ORDERS_PER_MINUTE,
            i64::from(self.orders_per_minute.load(Ordering::Relaxed)),
        );
        self.set_limit(limit.clamp(1, i64::from(u32::MAX)) as u32);

        let backoff = settings.get_int(
            keys::RATE_LIMIT_BACKOFF_MS,
            self.backoff_ms.load(Ordering::Relaxed) as i64,
        );
        self.backoff_ms.store(backoff.max(0) as u64, Ordering::Relaxed);
    }

    pub fn set_limit(&self, orders_per_minute: u32) {
        self.orders_per_minute
            .store(orders_per_minute.max(1), Ordering::Relaxed);
    }

    pub fn limit(&self) -> u32 {
        self.orders_per_minute.load(Ordering::Relaxed)
    }

    /// Spacing between permits
    pub fn interval(&self) -> Duration {
        Duration::from_millis(WINDOW_MS / u64::from(self.limit()))
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms.load(Ordering::Relaxed))
    }

    fn elapsed_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    /// Try to take a permit without waiting
    pub fn try_acquire(&self) -> Permit {
        let limit = u64::from(self.limit());
        let interval = WINDOW_MS / limit;
        let now = self.elapsed_ms();

        let next = self.next_slot_ms.load(Ordering::Acquire);
        if now < next {
            return Permit::Wait(Duration::from_millis(next - now));
        }
        if self
            .next_slot_ms
            .compare_exchange(next, now + interval, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Another task took this slot
            return Permit::Wait(Duration::ZERO);
        }

        let window = now / WINDOW_MS;
        let mut current = self.window.load(Ordering::Acquire);
        loop {
            let (index, count) = unpack(current);
            let count = if index == window { count } else { 0 };
            if count >= limit {
                return Permit::Exhausted;
            }
            match self.window.compare_exchange_weak(
                current,
                pack(window, count + 1),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Permit::Granted,
                Err(actual) => current = actual,
            }
        }
    }

    /// Wait until a permit is granted
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Permit::Granted => return,
                Permit::Wait(delay) if delay.is_zero() => tokio::task::yield_now().await,
                Permit::Wait(delay) => tokio::time::sleep(delay).await,
                Permit::Exhausted => {
                    let backoff = self.backoff();
                    tracing::debug!(backoff_ms = backoff.as_millis() as u64, "Rate limit window exhausted");
                    tokio::time::sleep(backoff.max(Duration::from_millis(1))).await;
                }
            }
        }
    }
}
