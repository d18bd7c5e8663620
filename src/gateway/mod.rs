//! Gateway core: value types, error taxonomy, session state machine,
//! connection manager, subscription registry, ingest pipeline and bar
//! aggregation for Chinese futures front-end market data.

pub mod bar;
pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod sanitize;
pub mod sdk;
pub mod state;
pub mod subscription;

mod core;

pub use bar::BarAggregator;
pub use config::{CtpConfig, DataFilterConfig, GatewayConfig, ReconnectConfig};
pub use core::Gateway;
pub use error::{GatewayError, GatewayErrorKind};
pub use metrics::GatewayMetrics;
pub use models::{Bar, BarPeriod, DataStatus, Depth, Exchange, PriceLevel, Tick};
pub use sdk::{NativeSdk, NullSdk, RawTick};
pub use state::{GatewayState, StateTransitionReason};
pub use subscription::SubscriptionRegistry;
