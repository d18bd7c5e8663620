//! Counter/gauge surface exposed as a sink interface; semantics only, no
//! actual exporter wiring (that lives with the external metrics collector).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::state::GatewayState;

/// Upper bounds (seconds) of the `tick_latency_seconds` histogram buckets.
pub const LATENCY_BUCKETS_SECONDS: [f64; 9] =
    [1e-4, 5e-4, 1e-3, 5e-3, 1e-2, 5e-2, 1e-1, 5e-1, 1.0];

/// Cumulative bucket counts for tick latency, mirroring a Prometheus-style
/// histogram without pulling in an exporter.
#[derive(Debug, Default)]
pub struct LatencyHistogram {
    buckets: [AtomicU64; LATENCY_BUCKETS_SECONDS.len()],
    overflow: AtomicU64,
}

impl LatencyHistogram {
    pub fn observe(&self, latency_us: i64) {
        let seconds = (latency_us.max(0) as f64) / 1_000_000.0;
        for (bound, counter) in LATENCY_BUCKETS_SECONDS.iter().zip(self.buckets.iter()) {
            if seconds <= *bound {
                counter.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        self.overflow.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative counts per bucket upper bound, plus the overflow count.
    pub fn snapshot(&self) -> Vec<(f64, u64)> {
        LATENCY_BUCKETS_SECONDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(bound, counter)| (*bound, counter.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Atomic counters/gauges for one gateway instance.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    pub tick_received_total: AtomicU64,
    pub tick_filtered_invalid_price: AtomicU64,
    pub tick_filtered_stale_timestamp: AtomicU64,
    pub tick_filtered_out_of_order: AtomicU64,
    pub reconnect_success_total: AtomicU64,
    pub reconnect_failure_total: AtomicU64,
    pub queue_drops_total: AtomicU64,
    pub tick_latency: LatencyHistogram,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_tick_latency(&self, latency_us: i64) {
        self.tick_latency.observe(latency_us);
    }

    #[inline]
    pub fn record_tick_received(&self) {
        self.tick_received_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_filtered(&self, reason: FilterReason) {
        match reason {
            FilterReason::InvalidPrice => {
                self.tick_filtered_invalid_price.fetch_add(1, Ordering::Relaxed)
            }
            FilterReason::StaleTimestamp => {
                self.tick_filtered_stale_timestamp.fetch_add(1, Ordering::Relaxed)
            }
            FilterReason::OutOfOrder => {
                self.tick_filtered_out_of_order.fetch_add(1, Ordering::Relaxed)
            }
        };
    }

    #[inline]
    pub fn record_reconnect(&self, success: bool) {
        if success {
            self.reconnect_success_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.reconnect_failure_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_queue_drop(&self) {
        self.queue_drops_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, state: GatewayState, subscriptions: usize, queue_size: usize) -> GatewayMetricsSnapshot {
        GatewayMetricsSnapshot {
            tick_received_total: self.tick_received_total.load(Ordering::Relaxed),
            tick_filtered_invalid_price: self.tick_filtered_invalid_price.load(Ordering::Relaxed),
            tick_filtered_stale_timestamp: self
                .tick_filtered_stale_timestamp
                .load(Ordering::Relaxed),
            tick_filtered_out_of_order: self.tick_filtered_out_of_order.load(Ordering::Relaxed),
            reconnect_success_total: self.reconnect_success_total.load(Ordering::Relaxed),
            reconnect_failure_total: self.reconnect_failure_total.load(Ordering::Relaxed),
            queue_drops_total: self.queue_drops_total.load(Ordering::Relaxed),
            gateway_state: state.ordinal(),
            gateway_subscriptions: subscriptions as u64,
            gateway_queue_size: queue_size as u64,
        }
    }

    /// Summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "ticks={} filtered(price={},stale={},order={}) reconnects(ok={},fail={}) queue_drops={}",
            self.tick_received_total.load(Ordering::Relaxed),
            self.tick_filtered_invalid_price.load(Ordering::Relaxed),
            self.tick_filtered_stale_timestamp.load(Ordering::Relaxed),
            self.tick_filtered_out_of_order.load(Ordering::Relaxed),
            self.reconnect_success_total.load(Ordering::Relaxed),
            self.reconnect_failure_total.load(Ordering::Relaxed),
            self.queue_drops_total.load(Ordering::Relaxed),
        )
    }
}

/// Reason a tick was dropped before reaching downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    InvalidPrice,
    StaleTimestamp,
    OutOfOrder,
}

/// Serializable point-in-time view of [`GatewayMetrics`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMetricsSnapshot {
    pub tick_received_total: u64,
    pub tick_filtered_invalid_price: u64,
    pub tick_filtered_stale_timestamp: u64,
    pub tick_filtered_out_of_order: u64,
    pub reconnect_success_total: u64,
    pub reconnect_failure_total: u64,
    pub queue_drops_total: u64,
    pub gateway_state: u8,
    pub gateway_subscriptions: u64,
    pub gateway_queue_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = GatewayMetrics::new();
        m.record_tick_received();
        m.record_tick_received();
        m.record_filtered(FilterReason::InvalidPrice);
        m.record_reconnect(true);
        m.record_reconnect(false);

        let snap = m.snapshot(GatewayState::Running, 3, 10);
        assert_eq!(snap.tick_received_total, 2);
        assert_eq!(snap.tick_filtered_invalid_price, 1);
        assert_eq!(snap.reconnect_success_total, 1);
        assert_eq!(snap.reconnect_failure_total, 1);
        assert_eq!(snap.gateway_subscriptions, 3);
        assert_eq!(snap.gateway_queue_size, 10);
    }

    #[test]
    fn latency_histogram_buckets_by_upper_bound() {
        let hist = LatencyHistogram::default();
        hist.observe(50); // 5e-5s, falls in the 1e-4 bucket
        hist.observe(2_000_000); // 2s, overflows every bucket

        let snap = hist.snapshot();
        assert_eq!(snap[0], (1e-4, 1));
        assert_eq!(hist.overflow.load(Ordering::Relaxed), 1);
    }
}
