//! Validated configuration records supplied at gateway construction.
//!
//! Loading and secret handling beyond this module are treated as an
//! external collaborator's concern; `GatewayConfig::from_env` mirrors the
//! env-var-with-defaults pattern used throughout this codebase.

use super::error::{GatewayError, GatewayErrorKind};

/// Matches `^tcp://[\w.\-]+:\d+$` without pulling in a regex dependency.
fn is_valid_front_addr(addr: &str) -> bool {
    let Some(rest) = addr.strip_prefix("tcp://") else {
        return false;
    };
    let Some((host, port)) = rest.rsplit_once(':') else {
        return false;
    };
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
        && !port.is_empty()
        && port.chars().all(|c| c.is_ascii_digit())
}

/// Which front-end protocol family a gateway instance targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayType {
    Ctp,
    SimNow,
    /// Reserved; the core has no IB support.
    Ib,
}

impl GatewayType {
    fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ctp" => Some(Self::Ctp),
            "simnow" => Some(Self::SimNow),
            "ib" => Some(Self::Ib),
            _ => None,
        }
    }
}

/// CTP front-end credentials and endpoint.
#[derive(Debug, Clone)]
pub struct CtpConfig {
    pub broker_id: String,
    pub investor_id: String,
    pub password: String,
    pub front_addr: String,
    pub auth_code: String,
    pub app_id: String,
}

impl CtpConfig {
    fn validate(&self) -> Result<(), GatewayError> {
        if !is_valid_front_addr(&self.front_addr) {
            let mut ctx = std::collections::BTreeMap::new();
            ctx.insert("front_addr".to_string(), serde_json::json!(self.front_addr));
            return Err(GatewayError::new(
                format!("front_addr '{}' does not match tcp://host:port", self.front_addr),
                GatewayErrorKind::DataValidationFailed,
            )
            .with_context(ctx));
        }
        Ok(())
    }
}

/// Exponential-backoff reconnect tuning.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_interval: f64,
    pub max_interval: f64,
    pub multiplier: f64,
    /// 0 means retry forever.
    pub max_attempts: u32,
    pub alert_threshold: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_interval: 1.0,
            max_interval: 60.0,
            multiplier: 2.0,
            max_attempts: 0,
            alert_threshold: 10,
        }
    }
}

/// Dirty-data filtering knobs applied during ingest.
#[derive(Debug, Clone)]
pub struct DataFilterConfig {
    pub filter_invalid_price: bool,
    pub filter_zero_volume: bool,
    pub stale_threshold_seconds: i64,
    pub log_dirty_data: bool,
}

impl Default for DataFilterConfig {
    fn default() -> Self {
        Self {
            filter_invalid_price: true,
            filter_zero_volume: false,
            stale_threshold_seconds: 3600,
            log_dirty_data: true,
        }
    }
}

/// Pub/sub sink configuration, treated as an inert external collaborator.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: u8,
    pub password: Option<String>,
    pub channel_prefix: String,
    pub max_connections: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
            channel_prefix: "market:".to_string(),
            max_connections: 10,
        }
    }
}

/// Persistence sink configuration, treated as an inert external collaborator.
#[derive(Debug, Clone)]
pub struct ClickHouseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub batch_size: u32,
    pub flush_interval_secs: f64,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9000,
            database: "quant".to_string(),
            user: "default".to_string(),
            password: String::new(),
            batch_size: 1000,
            flush_interval_secs: 1.0,
        }
    }
}

/// Top-level gateway configuration, validated at construction.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub gateway_type: GatewayType,
    pub gateway_name: String,
    pub connect_timeout_secs: f64,
    pub max_subscriptions: usize,
    pub tick_cache_seconds: u32,
    pub ctp: Option<CtpConfig>,
    pub reconnect: ReconnectConfig,
    pub data_filter: DataFilterConfig,
    pub redis: RedisConfig,
    pub clickhouse: ClickHouseConfig,
}

impl GatewayConfig {
    /// Validates cross-field invariants: CTP/SimNow gateways require a `ctp`
    /// block, and the embedded `front_addr` must parse.
    pub fn validate(&self) -> Result<(), GatewayError> {
        match self.gateway_type {
            GatewayType::Ctp | GatewayType::SimNow => {
                let ctp = self.ctp.as_ref().ok_or_else(|| {
                    GatewayError::new(
                        "ctp configuration is required for ctp/simnow gateways",
                        GatewayErrorKind::DataValidationFailed,
                    )
                })?;
                ctp.validate()?;
            }
            GatewayType::Ib => {}
        }
        Ok(())
    }

    /// Loads configuration from `GATEWAY_*` environment variables, falling
    /// back to documented defaults for everything but CTP credentials.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let gateway_type = std::env::var("GATEWAY_TYPE")
            .ok()
            .and_then(|v| GatewayType::from_str(&v))
            .unwrap_or(GatewayType::Ctp);

        let gateway_name =
            std::env::var("GATEWAY_NAME").unwrap_or_else(|_| "ctp_market".to_string());

        let connect_timeout_secs = std::env::var("GATEWAY_CONNECT_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10.0);

        let max_subscriptions = std::env::var("GATEWAY_MAX_SUBSCRIPTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000);

        let tick_cache_seconds = std::env::var("GATEWAY_TICK_CACHE_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let ctp = match (
            std::env::var("GATEWAY_CTP__BROKER_ID"),
            std::env::var("GATEWAY_CTP__INVESTOR_ID"),
            std::env::var("GATEWAY_CTP__PASSWORD"),
            std::env::var("GATEWAY_CTP__FRONT_ADDR"),
        ) {
            (Ok(broker_id), Ok(investor_id), Ok(password), Ok(front_addr)) => Some(CtpConfig {
                broker_id,
                investor_id,
                password,
                front_addr,
                auth_code: std::env::var("GATEWAY_CTP__AUTH_CODE").unwrap_or_default(),
                app_id: std::env::var("GATEWAY_CTP__APP_ID").unwrap_or_default(),
            }),
            _ => None,
        };

        let config = Self {
            gateway_type,
            gateway_name,
            connect_timeout_secs,
            max_subscriptions,
            tick_cache_seconds,
            ctp,
            reconnect: ReconnectConfig::default(),
            data_filter: DataFilterConfig::default(),
            redis: RedisConfig::default(),
            clickhouse: ClickHouseConfig::default(),
        };

        config.validate().map_err(|e| anyhow::anyhow!(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_ctp() -> CtpConfig {
        CtpConfig {
            broker_id: "9999".to_string(),
            investor_id: "123456".to_string(),
            password: "secret".to_string(),
            front_addr: "tcp://180.168.146.187:10211".to_string(),
            auth_code: String::new(),
            app_id: String::new(),
        }
    }

    #[test]
    fn malformed_front_addr_is_rejected() {
        let mut ctp = valid_ctp();
        ctp.front_addr = "http://host:10211".to_string();
        let err = ctp.validate().unwrap_err();
        assert!(err.message().contains("front_addr"));
    }

    #[test]
    fn ctp_gateway_requires_ctp_block() {
        let config = GatewayConfig {
            gateway_type: GatewayType::Ctp,
            gateway_name: "ctp_main".to_string(),
            connect_timeout_secs: 10.0,
            max_subscriptions: 1000,
            tick_cache_seconds: 30,
            ctp: None,
            reconnect: ReconnectConfig::default(),
            data_filter: DataFilterConfig::default(),
            redis: RedisConfig::default(),
            clickhouse: ClickHouseConfig::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn valid_ctp_config_passes() {
        let config = GatewayConfig {
            gateway_type: GatewayType::Ctp,
            gateway_name: "ctp_main".to_string(),
            connect_timeout_secs: 10.0,
            max_subscriptions: 1000,
            tick_cache_seconds: 30,
            ctp: Some(valid_ctp()),
            reconnect: ReconnectConfig::default(),
            data_filter: DataFilterConfig::default(),
            redis: RedisConfig::default(),
            clickhouse: ClickHouseConfig::default(),
        };
        assert!(config.validate().is_ok());
    }
}
