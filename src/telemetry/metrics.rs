//! Prometheus metrics

use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// One position watcher pass
    WatcherTick,
    /// One virtual order monitor pass
    OcoTick,
    /// Broker order submission
    OrderSubmission,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Stop-loss levels breached
    StopLossTriggered,
    /// Take-profit levels reached
    TakeProfitTriggered,
    /// Protective orders sent to the broker
    OrdersSubmitted,
    /// Exits refused by the cooldown guard
    ExitsBlocked,
    /// Siblings cancelled after an OCO execution
    OcoCancellations,
    /// Failed price lookups
    PriceFetchFailures,
    /// Risk events written
    RiskEvents,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Positions with a risk state
    TrackedPositions,
    /// Virtual orders awaiting a trigger
    MonitoredVirtualOrders,
    /// 1 while the panic stop is engaged
    PanicStop,
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::WatcherTick => "guard_watcher_tick_ms",
        LatencyMetric::OcoTick => "guard_oco_tick_ms",
        LatencyMetric::OrderSubmission => "guard_order_submission_ms",
    };

    metrics::histogram!(metric_name).record(duration.as_secs_f64() * 1000.0);
}

/// Increment a counter
pub fn increment(metric: CounterMetric, value: u64) {
    let metric_name = match metric {
        CounterMetric::StopLossTriggered => "guard_stop_loss_triggered_total",
        CounterMetric::TakeProfitTriggered => "guard_take_profit_triggered_total",
        CounterMetric::OrdersSubmitted => "guard_orders_submitted_total",
        CounterMetric::ExitsBlocked => "guard_exits_blocked_total",
        CounterMetric::OcoCancellations => "guard_oco_cancellations_total",
        CounterMetric::PriceFetchFailures => "guard_price_fetch_failures_total",
        CounterMetric::RiskEvents => "guard_risk_events_total",
    };

    metrics::counter!(metric_name).increment(value);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let metric_name = match metric {
        GaugeMetric::TrackedPositions => "guard_tracked_positions",
        GaugeMetric::MonitoredVirtualOrders => "guard_monitored_virtual_orders",
        GaugeMetric::PanicStop => "guard_panic_stop",
    };

    metrics::gauge!(metric_name).set(value);
}
