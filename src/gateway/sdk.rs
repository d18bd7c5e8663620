//! Native front-end SDK contract.
//!
//! The core treats the front-end SDK as an opaque callback source: `Init`,
//! `RegisterFront`, `RegisterSpi`, `ReqUserLogin`, `SubscribeMarketData`,
//! `UnSubscribeMarketData`, `Release`. A gateway is constructed against any
//! [`NativeSdk`] implementation; [`NullSdk`] is the offline/test fallback
//! that completes login immediately and treats subscribe as a no-op, so
//! every other code path can be exercised without the real SDK installed.

use async_trait::async_trait;

use super::error::GatewayError;

/// A raw record as delivered by the native SDK callback thread.
///
/// Field names mirror the wire contract: `InstrumentID`, `ExchangeID`,
/// `TradingDay` (YYYYMMDD), `UpdateTime` (HH:MM:SS), `UpdateMillisec`, plus
/// price/volume/limit fields.
#[derive(Debug, Clone)]
pub struct RawTick {
    pub instrument_id: String,
    pub exchange_id: String,
    pub trading_day: String,
    pub update_time: String,
    pub update_millisec: i64,
    pub last_price: f64,
    pub volume: i64,
    pub turnover: f64,
    pub open_interest: f64,
    pub bid_price_1: f64,
    pub bid_volume_1: i64,
    pub ask_price_1: f64,
    pub ask_volume_1: i64,
    pub pre_close_price: f64,
    pub pre_settlement_price: f64,
    pub upper_limit_price: f64,
    pub lower_limit_price: f64,
}

/// Opaque native front-end SDK contract. Implementations wrap the vendor
/// library; all methods may suspend while the underlying handshake runs.
#[async_trait]
pub trait NativeSdk: Send + Sync {
    /// Brings up the handle, registers the front address, and begins the
    /// asynchronous login. Resolves once a login outcome is known.
    async fn login(&self, front_addr: &str, broker_id: &str, investor_id: &str, password: &str) -> Result<(), GatewayError>;

    /// Subscribes a batch (already capped at the SDK's per-call limit).
    /// Returns `Ok(())` on a zero return code from the underlying call.
    async fn subscribe_batch(&self, symbols: &[String]) -> Result<(), GatewayError>;

    /// Unsubscribes a batch.
    async fn unsubscribe_batch(&self, symbols: &[String]) -> Result<(), GatewayError>;

    /// Releases the native handle.
    async fn release(&self);
}

/// Offline fallback used when the vendor SDK is unavailable: login
/// completes immediately (pass-through), subscribe/unsubscribe are no-ops.
/// Lets tests and simulations exercise every other code path.
#[derive(Debug, Default)]
pub struct NullSdk;

#[async_trait]
impl NativeSdk for NullSdk {
    async fn login(&self, _front_addr: &str, _broker_id: &str, _investor_id: &str, _password: &str) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn subscribe_batch(&self, _symbols: &[String]) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn unsubscribe_batch(&self, _symbols: &[String]) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn release(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_sdk_logs_in_without_side_effects() {
        let sdk = NullSdk;
        sdk.login("tcp://127.0.0.1:10211", "9999", "123456", "pw")
            .await
            .unwrap();
        sdk.subscribe_batch(&["IF2401".to_string()]).await.unwrap();
        sdk.unsubscribe_batch(&["IF2401".to_string()]).await.unwrap();
        sdk.release().await;
    }
}
