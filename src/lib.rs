//! CFFEX/CTP-family market-data gateway core.
//!
//! Connects a trading system to Chinese futures front-end servers, ingests
//! tick and depth messages over a proprietary TCP session, normalizes them
//! and delivers an ordered, back-pressured stream to downstream consumers.

pub mod gateway;

pub use gateway::{
    Bar, BarPeriod, CtpConfig, DataStatus, Depth, Exchange, Gateway, GatewayConfig, GatewayError,
    GatewayErrorKind, GatewayState, PriceLevel, ReconnectConfig, Tick,
};
