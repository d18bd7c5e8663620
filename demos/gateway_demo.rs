//! Gateway Demo Binary
//!
//! Brings up a gateway against the offline `NullSdk` fallback, subscribes a
//! couple of symbols, feeds a handful of synthetic ticks through the ingest
//! pipeline, and prints whatever reaches the downstream tick queue.
//!
//! Usage:
//!   cargo run --example gateway_demo

use std::sync::Arc;

use cffex_md_gateway::gateway::config::{CtpConfig, DataFilterConfig, GatewayType, ReconnectConfig};
use cffex_md_gateway::gateway::sdk::{NullSdk, RawTick};
use cffex_md_gateway::{Gateway, GatewayConfig};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

fn synthetic_tick(instrument_id: &str, last_price: f64, volume: i64, update_time: &str) -> RawTick {
    RawTick {
        instrument_id: instrument_id.to_string(),
        exchange_id: "CFFEX".to_string(),
        trading_day: "20240115".to_string(),
        update_time: update_time.to_string(),
        update_millisec: 0,
        last_price,
        volume,
        turnover: last_price * volume as f64,
        open_interest: 0.0,
        bid_price_1: last_price - 0.2,
        bid_volume_1: 10,
        ask_price_1: last_price + 0.2,
        ask_volume_1: 10,
        pre_close_price: 0.0,
        pre_settlement_price: 0.0,
        upper_limit_price: 0.0,
        lower_limit_price: 0.0,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let config = GatewayConfig {
        gateway_type: GatewayType::SimNow,
        gateway_name: "ctp_demo".to_string(),
        connect_timeout_secs: 5.0,
        max_subscriptions: 100,
        tick_cache_seconds: 30,
        ctp: Some(CtpConfig {
            broker_id: "9999".to_string(),
            investor_id: "123456".to_string(),
            password: "demo".to_string(),
            front_addr: "tcp://180.168.146.187:10211".to_string(),
            auth_code: String::new(),
            app_id: String::new(),
        }),
        reconnect: ReconnectConfig::default(),
        data_filter: DataFilterConfig::default(),
        redis: Default::default(),
        clickhouse: Default::default(),
    };

    let mut gateway = Gateway::new(config, Arc::new(NullSdk));

    gateway.on_bar(|bar| {
        info!(symbol = %bar.symbol, period = bar.period.label(), close = %bar.close, "bar_completed");
    });
    gateway.on_depth(|depth| {
        info!(symbol = %depth.symbol, spread = ?depth.spread(), "depth_update");
    });

    info!("connecting");
    gateway.connect().await?;
    let added = gateway.subscribe(&["IF2401".to_string(), "IF2402".to_string()]).await?;
    info!(symbols = ?added, "subscribed");

    for (price, volume, ts) in [
        (3500.0, 10_000, "10:30:00"),
        (3502.5, 10_050, "10:30:30"),
        (3498.0, 10_200, "10:31:05"),
    ] {
        gateway.ingest_raw(&synthetic_tick("IF2401", price, volume, ts));
    }

    while let Ok(Some(tick)) = tokio::time::timeout(std::time::Duration::from_millis(200), gateway.next_tick()).await {
        info!(symbol = %tick.symbol, price = %tick.last_price, status = tick.status.label(), "tick");
    }

    info!(summary = %gateway.metrics_snapshot().tick_received_total, "shutting down");
    gateway.disconnect().await;
    Ok(())
}
