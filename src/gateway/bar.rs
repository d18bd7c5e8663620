//! Per-(symbol, period) OHLCV bar aggregation from the tick stream.
//!
//! The raw `volume` field on a tick is a cumulative-day total, not a
//! per-interval delta; a bar therefore records the latest observed
//! snapshot rather than summing across ticks it has seen.

use chrono::{DateTime, TimeZone, Timelike, Utc};

use super::models::{Bar, BarPeriod, Exchange, Tick};

#[derive(Debug, Clone)]
struct InProgressBar {
    start: DateTime<Utc>,
    open: rust_decimal::Decimal,
    high: rust_decimal::Decimal,
    low: rust_decimal::Decimal,
    close: rust_decimal::Decimal,
    volume: i64,
    turnover: rust_decimal::Decimal,
    open_interest: rust_decimal::Decimal,
}

/// Builds completed bars for one (symbol, period) pair as ticks arrive.
#[derive(Debug)]
pub struct BarAggregator {
    symbol: String,
    exchange: Exchange,
    period: BarPeriod,
    gateway_name: String,
    current: Option<InProgressBar>,
}

/// Truncates a timestamp to the start of its bar period.
fn period_start(ts: DateTime<Utc>, period: BarPeriod) -> DateTime<Utc> {
    match period {
        BarPeriod::OneMinute => ts
            .with_second(0)
            .unwrap()
            .with_nanosecond(0)
            .unwrap(),
        BarPeriod::FiveMinutes => {
            let floored_minute = (ts.minute() / 5) * 5;
            ts.with_minute(floored_minute)
                .unwrap()
                .with_second(0)
                .unwrap()
                .with_nanosecond(0)
                .unwrap()
        }
        BarPeriod::FifteenMinutes => {
            let floored_minute = (ts.minute() / 15) * 15;
            ts.with_minute(floored_minute)
                .unwrap()
                .with_second(0)
                .unwrap()
                .with_nanosecond(0)
                .unwrap()
        }
        BarPeriod::ThirtyMinutes => {
            let floored_minute = (ts.minute() / 30) * 30;
            ts.with_minute(floored_minute)
                .unwrap()
                .with_second(0)
                .unwrap()
                .with_nanosecond(0)
                .unwrap()
        }
        BarPeriod::OneHour => ts
            .with_minute(0)
            .unwrap()
            .with_second(0)
            .unwrap()
            .with_nanosecond(0)
            .unwrap(),
        BarPeriod::Daily => {
            let date = ts.date_naive();
            Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap())
        }
    }
}

impl BarAggregator {
    pub fn new(symbol: impl Into<String>, exchange: Exchange, period: BarPeriod, gateway_name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            exchange,
            period,
            gateway_name: gateway_name.into(),
            current: None,
        }
    }

    /// Feeds one tick; returns a completed [`Bar`] if this tick rolled the
    /// period over.
    pub fn update(&mut self, tick: &Tick) -> Option<Bar> {
        let start = period_start(tick.timestamp, self.period);

        let completed = match &self.current {
            None => None,
            Some(bar) if start > bar.start => self.current.take().map(|b| self.to_bar(&b)),
            _ => None,
        };

        match &mut self.current {
            Some(bar) if start <= bar.start => {
                bar.high = bar.high.max(tick.last_price);
                bar.low = bar.low.min(tick.last_price);
                bar.close = tick.last_price;
                bar.volume = tick.volume;
                bar.turnover = tick.turnover;
                bar.open_interest = tick.open_interest;
            }
            _ => {
                self.current = Some(InProgressBar {
                    start,
                    open: tick.last_price,
                    high: tick.last_price,
                    low: tick.last_price,
                    close: tick.last_price,
                    volume: tick.volume,
                    turnover: tick.turnover,
                    open_interest: tick.open_interest,
                });
            }
        }

        completed
    }

    fn to_bar(&self, bar: &InProgressBar) -> Bar {
        Bar {
            symbol: self.symbol.clone(),
            exchange: self.exchange,
            period: self.period,
            bar_datetime: bar.start,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            turnover: bar.turnover,
            open_interest: bar.open_interest,
            gateway_name: self.gateway_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tick_at(ts: DateTime<Utc>, price: rust_decimal::Decimal, volume: i64) -> Tick {
        use crate::gateway::models::DataStatus;
        Tick {
            symbol: "IF2401".to_string(),
            exchange: Exchange::Cffex,
            timestamp: ts,
            last_price: price,
            volume,
            turnover: dec!(0),
            open_interest: dec!(0),
            bid_price_1: dec!(0),
            bid_volume_1: 0,
            ask_price_1: dec!(0),
            ask_volume_1: 0,
            pre_close: dec!(0),
            pre_settlement: dec!(0),
            upper_limit: dec!(0),
            lower_limit: dec!(0),
            gateway_name: "ctp_main".to_string(),
            local_timestamp: ts,
            status: DataStatus::Valid,
        }
    }

    #[test]
    fn first_tick_opens_a_bar_without_emitting() {
        let mut agg = BarAggregator::new("IF2401", Exchange::Cffex, BarPeriod::OneMinute, "ctp_main");
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 5).unwrap();
        assert!(agg.update(&tick_at(ts, dec!(3500), 100)).is_none());
    }

    #[test]
    fn ticks_within_period_update_high_low_close() {
        let mut agg = BarAggregator::new("IF2401", Exchange::Cffex, BarPeriod::OneMinute, "ctp_main");
        let t0 = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 5).unwrap();
        agg.update(&tick_at(t0, dec!(3500), 100));

        let t1 = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 40).unwrap();
        assert!(agg.update(&tick_at(t1, dec!(3510), 150)).is_none());

        let t2 = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 50).unwrap();
        let completed = agg.update(&tick_at(t2, dec!(3490), 50));
        assert!(completed.is_none());
    }

    #[test]
    fn period_rollover_emits_previous_bar() {
        let mut agg = BarAggregator::new("IF2401", Exchange::Cffex, BarPeriod::OneMinute, "ctp_main");
        let t0 = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 5).unwrap();
        agg.update(&tick_at(t0, dec!(3500), 100));
        let t1 = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 40).unwrap();
        agg.update(&tick_at(t1, dec!(3510), 150));

        let t2 = Utc.with_ymd_and_hms(2024, 1, 15, 10, 31, 0).unwrap();
        let bar = agg.update(&tick_at(t2, dec!(3505), 200)).expect("bar should complete");

        assert_eq!(bar.open, dec!(3500));
        assert_eq!(bar.high, dec!(3510));
        assert_eq!(bar.low, dec!(3500));
        assert_eq!(bar.close, dec!(3510));
        assert_eq!(bar.volume, 150);
        let (ok, _) = bar.validate();
        assert!(ok);
    }

    #[test]
    fn volume_records_latest_snapshot_not_a_sum() {
        let mut agg = BarAggregator::new("IF2401", Exchange::Cffex, BarPeriod::OneMinute, "ctp_main");
        let t0 = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 5).unwrap();
        agg.update(&tick_at(t0, dec!(3500), 100));
        let t1 = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 40).unwrap();
        agg.update(&tick_at(t1, dec!(3510), 9_999));

        let t2 = Utc.with_ymd_and_hms(2024, 1, 15, 10, 31, 0).unwrap();
        let bar = agg.update(&tick_at(t2, dec!(3505), 10_050)).unwrap();
        assert_eq!(bar.volume, 9_999);
    }
}
