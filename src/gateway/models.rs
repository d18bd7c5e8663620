//! Value types: Tick, Depth, Bar, PriceLevel, and their supporting enums.
//!
//! Construction is total; invalid field combinations are representable but
//! are rejected by `validate()`, which reports `(ok, errors)` and mutates
//! `status` on failure rather than panicking.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Closed set of China futures exchanges the core understands, plus a
/// sentinel for anything outside that set. `Unknown` is representable so a
/// garbage `exchange_id` on the wire survives through to `Tick::validate()`
/// as an error instead of being silently coerced into a real exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    Cffex,
    Shfe,
    Dce,
    Czce,
    Ine,
    Gfex,
    Unknown,
}

impl Exchange {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CFFEX" => Some(Self::Cffex),
            "SHFE" => Some(Self::Shfe),
            "DCE" => Some(Self::Dce),
            "CZCE" => Some(Self::Czce),
            "INE" => Some(Self::Ine),
            "GFEX" => Some(Self::Gfex),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cffex => "CFFEX",
            Self::Shfe => "SHFE",
            Self::Dce => "DCE",
            Self::Czce => "CZCE",
            Self::Ine => "INE",
            Self::Gfex => "GFEX",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Lifecycle status of a tick record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataStatus {
    Valid,
    Stale,
    Invalid,
    Filtered,
}

impl DataStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Stale => "STALE",
            Self::Invalid => "INVALID",
            Self::Filtered => "FILTERED",
        }
    }
}

/// Bar aggregation period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarPeriod {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    Daily,
}

impl BarPeriod {
    pub fn seconds(&self) -> i64 {
        match self {
            Self::OneMinute => 60,
            Self::FiveMinutes => 300,
            Self::FifteenMinutes => 900,
            Self::ThirtyMinutes => 1800,
            Self::OneHour => 3600,
            Self::Daily => 86_400,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::Daily => "daily",
        }
    }
}

/// A single price/volume/order-count level in a depth book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub volume: i64,
    pub order_count: i32,
}

/// An immutable-after-validation snapshot for one symbol at one timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub exchange: Exchange,
    pub timestamp: DateTime<Utc>,
    pub last_price: Decimal,
    pub volume: i64,
    pub turnover: Decimal,
    pub open_interest: Decimal,
    pub bid_price_1: Decimal,
    pub bid_volume_1: i64,
    pub ask_price_1: Decimal,
    pub ask_volume_1: i64,
    pub pre_close: Decimal,
    pub pre_settlement: Decimal,
    pub upper_limit: Decimal,
    pub lower_limit: Decimal,
    pub gateway_name: String,
    pub local_timestamp: DateTime<Utc>,
    pub status: DataStatus,
}

impl Tick {
    /// Validates invariants and mutates `status` accordingly.
    ///
    /// Two special rules: `volume == 0` with `last_price == 0` is treated
    /// as a pre-open row and does not fail the price invariant; staleness
    /// is computed against wall-clock UTC.
    pub fn validate(&mut self, stale_threshold_seconds: i64) -> (bool, Vec<String>) {
        let mut errors = Vec::new();

        if self.symbol.is_empty() {
            errors.push("symbol must not be empty".to_string());
        }

        if self.exchange == Exchange::Unknown {
            errors.push(format!("invalid exchange: {}", self.exchange.as_str()));
        }

        let is_pre_open = self.volume == 0 && self.last_price.is_zero();
        if !is_pre_open && self.volume > 0 && self.last_price <= Decimal::ZERO {
            errors.push(format!("invalid price: {}", self.last_price));
        }

        if !errors.is_empty() {
            self.status = DataStatus::Invalid;
            return (false, errors);
        }

        let age = (Utc::now() - self.timestamp).num_seconds().abs();
        if age > stale_threshold_seconds {
            self.status = DataStatus::Stale;
            return (true, errors);
        }

        self.status = DataStatus::Valid;
        (true, errors)
    }

    /// Microseconds elapsed between exchange timestamp and local reception.
    pub fn latency_us(&self) -> i64 {
        (self.local_timestamp - self.timestamp).num_microseconds().unwrap_or(0)
    }

    /// First 16 hex chars of MD5(symbol ":" timestamp_iso8601).
    pub fn unique_id(&self) -> String {
        let key = format!("{}:{}", self.symbol, self.timestamp.to_rfc3339());
        let digest = md5::compute(key.as_bytes());
        format!("{:x}", digest)[..16].to_string()
    }

    /// Serializes to a transport-neutral map: decimals and timestamps as
    /// strings, `status` as its label.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        let mut map = BTreeMap::new();
        map.insert("symbol".to_string(), json!(self.symbol));
        map.insert("exchange".to_string(), json!(self.exchange.as_str()));
        map.insert("timestamp".to_string(), json!(self.timestamp.to_rfc3339()));
        map.insert("last_price".to_string(), json!(self.last_price.to_string()));
        map.insert("volume".to_string(), json!(self.volume));
        map.insert("turnover".to_string(), json!(self.turnover.to_string()));
        map.insert("open_interest".to_string(), json!(self.open_interest.to_string()));
        map.insert("bid_price_1".to_string(), json!(self.bid_price_1.to_string()));
        map.insert("bid_volume_1".to_string(), json!(self.bid_volume_1));
        map.insert("ask_price_1".to_string(), json!(self.ask_price_1.to_string()));
        map.insert("ask_volume_1".to_string(), json!(self.ask_volume_1));
        map.insert("pre_close".to_string(), json!(self.pre_close.to_string()));
        map.insert("pre_settlement".to_string(), json!(self.pre_settlement.to_string()));
        map.insert("upper_limit".to_string(), json!(self.upper_limit.to_string()));
        map.insert("lower_limit".to_string(), json!(self.lower_limit.to_string()));
        map.insert("gateway_name".to_string(), json!(self.gateway_name));
        map.insert(
            "local_timestamp".to_string(),
            json!(self.local_timestamp.to_rfc3339()),
        );
        map.insert("status".to_string(), json!(self.status.label()));
        map
    }
}

/// A level-2 order-book snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Depth {
    pub symbol: String,
    pub exchange: Exchange,
    pub timestamp: DateTime<Utc>,
    /// Descending price.
    pub bids: Vec<PriceLevel>,
    /// Ascending price.
    pub asks: Vec<PriceLevel>,
}

impl Depth {
    pub fn bid_price_1(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn ask_price_1(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.ask_price_1(), self.bid_price_1()) {
            (Some(ask), Some(bid)) => Some(ask - bid),
            _ => None,
        }
    }
}

/// A fixed-period OHLCV aggregation derived from ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub exchange: Exchange,
    pub period: BarPeriod,
    pub bar_datetime: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
    pub turnover: Decimal,
    pub open_interest: Decimal,
    pub gateway_name: String,
}

impl Bar {
    pub fn validate(&self) -> (bool, Vec<String>) {
        let mut errors = Vec::new();
        if self.low > self.open || self.open > self.high {
            errors.push(format!(
                "open {} not within [low {}, high {}]",
                self.open, self.low, self.high
            ));
        }
        if self.low > self.close || self.close > self.high {
            errors.push(format!(
                "close {} not within [low {}, high {}]",
                self.close, self.low, self.high
            ));
        }
        (errors.is_empty(), errors)
    }
}
