//! Panic stop switch

use crate::telemetry::{set_gauge, GaugeMetric};
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag that short-circuits every monitoring pass while engaged
#[derive(Debug, Default)]
pub struct PanicSwitch {
    engaged: AtomicBool,
}

impl PanicSwitch {
    pub fn new(engaged: bool) -> Self {
        Self {
            engaged: AtomicBool::new(engaged),
        }
    }

    /// Engage the stop. Returns false if it was already engaged.
    pub fn engage(&self) -> bool {
        let changed = self
            .engaged
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if changed {
            tracing::warn!("Panic stop engaged");
            set_gauge(GaugeMetric::PanicStop, 1.0);
        }
        changed
    }

    /// Release the stop. Returns false if it was not engaged.
    pub fn release(&self) -> bool {
        let changed = self
            .engaged
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if changed {
            tracing::info!("Panic stop released");
            set_gauge(GaugeMetric::PanicStop, 0.0);
        }
        changed
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }
}
