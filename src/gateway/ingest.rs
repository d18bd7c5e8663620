//! SDK-thread -> dispatch-loop bridge, tick conversion, ordering/staleness
//! checks, bounded queue publish, ring-buffer cache, and callback fan-out.
//!
//! Everything in [`IngestPipeline`] is designed to be touched only from the
//! dispatch loop; the only sanctioned cross-context hop is the raw-tick
//! channel fed by the SDK callback thread (see [`RawTickSender`]).

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{error, warn};

use super::bar::BarAggregator;
use super::config::DataFilterConfig;
use super::metrics::{FilterReason, GatewayMetrics};
use super::models::{Bar, BarPeriod, DataStatus, Depth, Exchange, PriceLevel, Tick};
use super::sdk::RawTick;

/// Default bounded-queue capacity between the dispatch loop and consumers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
/// Default ring-buffer capacity: ~30s at 5,000 ticks/s.
pub const DEFAULT_CACHE_CAPACITY: usize = 150_000;

/// Per-symbol bar periods initialized on subscribe.
const DEFAULT_BAR_PERIODS: [BarPeriod; 2] = [BarPeriod::OneMinute, BarPeriod::FiveMinutes];

/// Sender half of the SDK-thread -> dispatch-loop bridge. Cloneable so the
/// native callback thread can hold its own handle; `send` never blocks the
/// caller beyond the channel's internal bookkeeping.
pub type RawTickSender = mpsc::UnboundedSender<(String, Exchange, RawTick)>;
pub type RawTickReceiver = mpsc::UnboundedReceiver<(String, Exchange, RawTick)>;

fn parse_timestamp(raw: &RawTick) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(&raw.trading_day, "%Y%m%d").ok()?;
    let time = NaiveTime::parse_from_str(&raw.update_time, "%H:%M:%S").ok()?;
    let naive = date.and_time(time) + chrono::Duration::microseconds(raw.update_millisec * 1000);
    Some(Utc.from_utc_datetime(&naive))
}

fn to_decimal(v: f64) -> Decimal {
    Decimal::from_f64_retain(v).unwrap_or(Decimal::ZERO)
}

/// Converts a raw SDK record into a [`Tick`], substituting `now(UTC)` on a
/// timestamp parse failure rather than dropping the record.
pub fn convert_tick(raw: &RawTick, gateway_name: &str) -> Tick {
    let exchange = Exchange::from_str(&raw.exchange_id).unwrap_or(Exchange::Unknown);
    let timestamp = parse_timestamp(raw).unwrap_or_else(Utc::now);
    let now = Utc::now();

    Tick {
        symbol: raw.instrument_id.clone(),
        exchange,
        timestamp,
        last_price: to_decimal(raw.last_price),
        volume: raw.volume,
        turnover: to_decimal(raw.turnover),
        open_interest: to_decimal(raw.open_interest),
        bid_price_1: to_decimal(raw.bid_price_1),
        bid_volume_1: raw.bid_volume_1,
        ask_price_1: to_decimal(raw.ask_price_1),
        ask_volume_1: raw.ask_volume_1,
        pre_close: to_decimal(raw.pre_close_price),
        pre_settlement: to_decimal(raw.pre_settlement_price),
        upper_limit: to_decimal(raw.upper_limit_price),
        lower_limit: to_decimal(raw.lower_limit_price),
        gateway_name: gateway_name.to_string(),
        local_timestamp: now,
        status: DataStatus::Valid,
    }
}

/// Derives a one-level [`Depth`] from the same raw record a [`Tick`] is
/// built from, mirroring `OnRtnDepthMarketData` carrying both in a single
/// callback on the wire. `order_count` is unavailable at this level and is
/// always zero.
pub fn convert_depth(raw: &RawTick) -> Depth {
    let exchange = Exchange::from_str(&raw.exchange_id).unwrap_or(Exchange::Unknown);
    let timestamp = parse_timestamp(raw).unwrap_or_else(Utc::now);

    Depth {
        symbol: raw.instrument_id.clone(),
        exchange,
        timestamp,
        bids: vec![PriceLevel {
            price: to_decimal(raw.bid_price_1),
            volume: raw.bid_volume_1,
            order_count: 0,
        }],
        asks: vec![PriceLevel {
            price: to_decimal(raw.ask_price_1),
            volume: raw.ask_volume_1,
            order_count: 0,
        }],
    }
}

type TickCallback = Box<dyn Fn(&Tick) + Send + Sync>;
type BarCallback = Box<dyn Fn(&Bar) + Send + Sync>;
type DepthCallback = Box<dyn Fn(&Depth) + Send + Sync>;

/// Outcome of processing one raw record, for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Delivered,
    FilteredInvalid,
    DiscardedOutOfOrder,
}

/// Owns all ingest-side mutable state: last-seen timestamps, the ring
/// buffer, bar aggregators, and the bounded downstream queue.
pub struct IngestPipeline {
    gateway_name: String,
    data_filter: DataFilterConfig,
    last_seen: HashMap<String, DateTime<Utc>>,
    cache: VecDeque<Tick>,
    cache_capacity: usize,
    tick_tx: mpsc::Sender<Tick>,
    bar_aggregators: HashMap<String, HashMap<BarPeriod, BarAggregator>>,
    tick_callbacks: Vec<TickCallback>,
    bar_callbacks: Vec<BarCallback>,
    depth_callbacks: Vec<DepthCallback>,
    last_tick_at: Option<DateTime<Utc>>,
    metrics: Arc<GatewayMetrics>,
    queue_len: Arc<AtomicUsize>,
}

impl IngestPipeline {
    pub fn new(
        gateway_name: impl Into<String>,
        data_filter: DataFilterConfig,
        queue_capacity: usize,
        cache_capacity: usize,
        metrics: Arc<GatewayMetrics>,
    ) -> (Self, mpsc::Receiver<Tick>) {
        let (tick_tx, tick_rx) = mpsc::channel(queue_capacity);
        let pipeline = Self {
            gateway_name: gateway_name.into(),
            data_filter,
            last_seen: HashMap::new(),
            cache: VecDeque::with_capacity(cache_capacity.min(1024)),
            cache_capacity,
            tick_tx,
            bar_aggregators: HashMap::new(),
            tick_callbacks: Vec::new(),
            bar_callbacks: Vec::new(),
            depth_callbacks: Vec::new(),
            last_tick_at: None,
            metrics,
            queue_len: Arc::new(AtomicUsize::new(0)),
        };
        (pipeline, tick_rx)
    }

    /// Shared counter tracking the downstream tick queue's occupancy; the
    /// consumer side (`Gateway::next_tick`) decrements it on every `recv`.
    pub fn queue_len_handle(&self) -> Arc<AtomicUsize> {
        self.queue_len.clone()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn on_tick<F>(&mut self, callback: F)
    where
        F: Fn(&Tick) + Send + Sync + 'static,
    {
        self.tick_callbacks.push(Box::new(callback));
    }

    pub fn on_bar<F>(&mut self, callback: F)
    where
        F: Fn(&Bar) + Send + Sync + 'static,
    {
        self.bar_callbacks.push(Box::new(callback));
    }

    pub fn on_depth<F>(&mut self, callback: F)
    where
        F: Fn(&Depth) + Send + Sync + 'static,
    {
        self.depth_callbacks.push(Box::new(callback));
    }

    /// Initializes bar aggregators for a newly subscribed symbol.
    pub fn init_symbol(&mut self, symbol: &str, exchange: Exchange) {
        let generators = self.bar_aggregators.entry(symbol.to_string()).or_default();
        for period in DEFAULT_BAR_PERIODS {
            generators
                .entry(period)
                .or_insert_with(|| BarAggregator::new(symbol, exchange, period, self.gateway_name.clone()));
        }
    }

    /// Drops last-seen and aggregator state for an unsubscribed symbol.
    pub fn remove_symbol(&mut self, symbol: &str) {
        self.last_seen.remove(symbol);
        self.bar_aggregators.remove(symbol);
    }

    pub fn last_tick_at(&self) -> Option<DateTime<Utc>> {
        self.last_tick_at
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Runs steps 2-7 of the ingest pipeline against a tick already routed
    /// off the SDK thread.
    pub fn process_raw(&mut self, raw: &RawTick) -> IngestOutcome {
        self.metrics.record_tick_received();
        let mut tick = convert_tick(raw, &self.gateway_name);

        let (ok, errors) = tick.validate(self.data_filter.stale_threshold_seconds);
        if !ok {
            if self.data_filter.log_dirty_data {
                warn!(symbol = %tick.symbol, reasons = ?errors, "dirty_tick_filtered");
            }
            tick.status = DataStatus::Filtered;
            self.metrics.record_filtered(FilterReason::InvalidPrice);
            return IngestOutcome::FilteredInvalid;
        }

        if let Some(last) = self.last_seen.get(&tick.symbol) {
            if tick.timestamp < *last {
                self.metrics.record_filtered(FilterReason::OutOfOrder);
                return IngestOutcome::DiscardedOutOfOrder;
            }
        }
        self.last_seen.insert(tick.symbol.clone(), tick.timestamp);

        self.init_symbol(&tick.symbol, tick.exchange);
        if let Some(generators) = self.bar_aggregators.get_mut(&tick.symbol) {
            for generator in generators.values_mut() {
                if let Some(bar) = generator.update(&tick) {
                    self.fan_out_bar(&bar);
                }
            }
        }
        self.fan_out_depth(&convert_depth(raw));

        if self.tick_tx.try_send(tick.clone()).is_ok() {
            self.queue_len.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.record_queue_drop();
            warn!(symbol = %tick.symbol, "tick_queue_full_dropping");
        }

        if self.cache.len() >= self.cache_capacity {
            self.cache.pop_front();
        }
        self.cache.push_back(tick.clone());
        self.last_tick_at = Some(Utc::now());
        self.metrics.record_tick_latency(tick.latency_us());

        self.fan_out_tick(&tick);
        IngestOutcome::Delivered
    }

    fn fan_out_tick(&self, tick: &Tick) {
        for callback in &self.tick_callbacks {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(tick))) {
                log_callback_panic(panic, "tick_callback_panicked");
            }
        }
    }

    fn fan_out_bar(&self, bar: &Bar) {
        for callback in &self.bar_callbacks {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(bar))) {
                log_callback_panic(panic, "bar_callback_panicked");
            }
        }
    }

    fn fan_out_depth(&self, depth: &Depth) {
        for callback in &self.depth_callbacks {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(depth))) {
                log_callback_panic(panic, "depth_callback_panicked");
            }
        }
    }
}

fn log_callback_panic(panic: Box<dyn std::any::Any + Send>, context: &str) {
    let msg = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    error!(error = %msg, "{}", context);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn raw_happy_path() -> RawTick {
        RawTick {
            instrument_id: "IF2401".to_string(),
            exchange_id: "CFFEX".to_string(),
            trading_day: "20240115".to_string(),
            update_time: "10:30:00".to_string(),
            update_millisec: 500,
            last_price: 3500.0,
            volume: 10_000,
            turnover: 0.0,
            open_interest: 0.0,
            bid_price_1: 3499.8,
            bid_volume_1: 10,
            ask_price_1: 3500.2,
            ask_volume_1: 10,
            pre_close_price: 0.0,
            pre_settlement_price: 0.0,
            upper_limit_price: 0.0,
            lower_limit_price: 0.0,
        }
    }

    #[test]
    fn happy_path_tick_is_delivered_once() {
        let metrics = Arc::new(GatewayMetrics::new());
        let (mut pipeline, _rx) =
            IngestPipeline::new("ctp_main", DataFilterConfig::default(), 10_000, 150_000, metrics);
        pipeline.init_symbol("IF2401", Exchange::Cffex);

        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        pipeline.on_tick(move |t| {
            assert_eq!(t.status, DataStatus::Valid);
            assert!(t.latency_us() >= 0);
            count2.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = pipeline.process_raw(&raw_happy_path());
        assert_eq!(outcome, IngestOutcome::Delivered);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_price_is_filtered_and_not_delivered() {
        let metrics = Arc::new(GatewayMetrics::new());
        let (mut pipeline, _rx) =
            IngestPipeline::new("ctp_main", DataFilterConfig::default(), 10_000, 150_000, metrics.clone());

        let mut raw = raw_happy_path();
        raw.last_price = -1.0;
        raw.volume = 100;

        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        pipeline.on_tick(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = pipeline.process_raw(&raw);
        assert_eq!(outcome, IngestOutcome::FilteredInvalid);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(metrics.tick_filtered_invalid_price.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn unrecognized_exchange_id_is_filtered() {
        let metrics = Arc::new(GatewayMetrics::new());
        let (mut pipeline, _rx) =
            IngestPipeline::new("ctp_main", DataFilterConfig::default(), 10_000, 150_000, metrics);

        let mut raw = raw_happy_path();
        raw.exchange_id = "NYSE".to_string();

        let outcome = pipeline.process_raw(&raw);
        assert_eq!(outcome, IngestOutcome::FilteredInvalid);
    }

    #[test]
    fn pre_open_zero_row_is_delivered() {
        let metrics = Arc::new(GatewayMetrics::new());
        let (mut pipeline, _rx) =
            IngestPipeline::new("ctp_main", DataFilterConfig::default(), 10_000, 150_000, metrics);

        let mut raw = raw_happy_path();
        raw.last_price = 0.0;
        raw.volume = 0;

        let outcome = pipeline.process_raw(&raw);
        assert_eq!(outcome, IngestOutcome::Delivered);
    }

    #[test]
    fn out_of_order_tick_is_discarded() {
        let metrics = Arc::new(GatewayMetrics::new());
        let (mut pipeline, _rx) =
            IngestPipeline::new("ctp_main", DataFilterConfig::default(), 10_000, 150_000, metrics);

        let first = raw_happy_path();
        pipeline.process_raw(&first);

        let mut older = raw_happy_path();
        older.update_time = "10:29:00".to_string();
        let outcome = pipeline.process_raw(&older);
        assert_eq!(outcome, IngestOutcome::DiscardedOutOfOrder);
    }

    #[test]
    fn equal_timestamp_ties_are_accepted() {
        let metrics = Arc::new(GatewayMetrics::new());
        let (mut pipeline, _rx) =
            IngestPipeline::new("ctp_main", DataFilterConfig::default(), 10_000, 150_000, metrics);

        let raw = raw_happy_path();
        assert_eq!(pipeline.process_raw(&raw), IngestOutcome::Delivered);
        assert_eq!(pipeline.process_raw(&raw), IngestOutcome::Delivered);
    }

    #[test]
    fn ring_buffer_evicts_oldest_past_capacity() {
        let metrics = Arc::new(GatewayMetrics::new());
        let (mut pipeline, _rx) = IngestPipeline::new("ctp_main", DataFilterConfig::default(), 10_000, 2, metrics);

        let mut raw = raw_happy_path();
        pipeline.process_raw(&raw);
        raw.update_time = "10:31:00".to_string();
        pipeline.process_raw(&raw);
        raw.update_time = "10:32:00".to_string();
        pipeline.process_raw(&raw);

        assert_eq!(pipeline.cache_len(), 2);
    }

    #[test]
    fn depth_callback_sees_level_one_book() {
        let metrics = Arc::new(GatewayMetrics::new());
        let (mut pipeline, _rx) =
            IngestPipeline::new("ctp_main", DataFilterConfig::default(), 10_000, 150_000, metrics);

        let spread = Arc::new(std::sync::Mutex::new(None));
        let spread2 = spread.clone();
        pipeline.on_depth(move |d| {
            *spread2.lock().unwrap() = d.spread();
        });

        pipeline.process_raw(&raw_happy_path());
        assert_eq!(*spread.lock().unwrap(), Some(rust_decimal_macros::dec!(0.4)));
    }

    #[test]
    fn panicking_tick_callback_does_not_block_others() {
        let metrics = Arc::new(GatewayMetrics::new());
        let (mut pipeline, _rx) =
            IngestPipeline::new("ctp_main", DataFilterConfig::default(), 10_000, 150_000, metrics);

        let saw_second = Arc::new(AtomicUsize::new(0));
        let saw_second2 = saw_second.clone();
        pipeline.on_tick(|_| panic!("boom"));
        pipeline.on_tick(move |_| {
            saw_second2.fetch_add(1, Ordering::SeqCst);
        });

        pipeline.process_raw(&raw_happy_path());
        assert_eq!(saw_second.load(Ordering::SeqCst), 1);
    }
}
