//! Connection manager: SDK bring-up, login handshake, disconnect, and the
//! exponential-backoff reconnect loop with subscription restore.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{info, warn};

use super::config::{CtpConfig, ReconnectConfig};
use super::error::{GatewayError, GatewayErrorKind};
use super::sdk::NativeSdk;
use super::state::{GatewayState, SessionStateMachine, StateTransitionReason};

/// Deterministic exponential backoff: `min(initial * multiplier^k, max)` for
/// `k = 0, 1, ...`. Deliberately has no jitter term — downstream tooling
/// pins the exact interval sequence for a given config.
#[derive(Debug)]
pub struct BackoffCalculator {
    config: ReconnectConfig,
    attempt: u32,
}

impl BackoffCalculator {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    pub fn next_interval_secs(&mut self) -> f64 {
        let base = self.config.initial_interval * self.config.multiplier.powi(self.attempt as i32);
        self.attempt += 1;
        base.min(self.config.max_interval)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Tracks consecutive reconnect failures, reset on successful login.
#[derive(Debug, Default)]
pub struct ReconnectState {
    pub consecutive_failures: u32,
}

/// Drives SDK bring-up/teardown and the reconnect loop. Holds no gateway
/// state of its own beyond backoff/failure bookkeeping; subscription
/// restore and state transitions are delegated to the caller (the
/// dispatch-loop-owned `Gateway`) so everything still serializes on one
/// task per §5.
pub struct ConnectionManager {
    sdk: Arc<dyn NativeSdk>,
    state: Arc<SessionStateMachine>,
    reconnect_config: ReconnectConfig,
    backoff: BackoffCalculator,
    reconnect_state: ReconnectState,
    connected_at: Option<DateTime<Utc>>,
    shutdown: Arc<Notify>,
}

impl ConnectionManager {
    pub fn new(sdk: Arc<dyn NativeSdk>, state: Arc<SessionStateMachine>, reconnect_config: ReconnectConfig) -> Self {
        Self {
            sdk,
            state,
            backoff: BackoffCalculator::new(reconnect_config.clone()),
            reconnect_config,
            reconnect_state: ReconnectState::default(),
            connected_at: None,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }

    /// Idempotent when already CONNECTED/SUBSCRIBING/RUNNING.
    pub async fn connect(&mut self, ctp: &CtpConfig, connect_timeout_secs: f64) -> Result<(), GatewayError> {
        match self.state.state() {
            GatewayState::Connected | GatewayState::Subscribing | GatewayState::Running => {
                info!("connect() called while already connected, returning");
                return Ok(());
            }
            _ => {}
        }

        self.state.transition(GatewayState::Connecting, StateTransitionReason::Started);

        let login = self.sdk.login(&ctp.front_addr, &ctp.broker_id, &ctp.investor_id, &ctp.password);
        let timeout = StdDuration::from_secs_f64(connect_timeout_secs);

        match tokio::time::timeout(timeout, login).await {
            Ok(Ok(())) => {
                self.connected_at = Some(Utc::now());
                self.backoff.reset();
                self.reconnect_state.consecutive_failures = 0;
                self.state.transition(GatewayState::Connected, StateTransitionReason::ConnectSuccess);
                Ok(())
            }
            Ok(Err(login_err)) => {
                self.state.transition(GatewayState::Error, StateTransitionReason::AuthFailed);
                let mut ctx = std::collections::BTreeMap::new();
                ctx.insert("host".to_string(), serde_json::json!(ctp.front_addr));
                Err(GatewayError::new("login failed", GatewayErrorKind::AuthFailed)
                    .with_context(ctx)
                    .with_cause(login_err))
            }
            Err(_elapsed) => {
                self.state.transition(GatewayState::Error, StateTransitionReason::ConnectTimeout);
                let mut ctx = std::collections::BTreeMap::new();
                ctx.insert("host".to_string(), serde_json::json!(ctp.front_addr));
                ctx.insert("timeout_seconds".to_string(), serde_json::json!(connect_timeout_secs));
                Err(GatewayError::new("connect timed out", GatewayErrorKind::ConnectionTimeout).with_context(ctx))
            }
        }
    }

    /// Cancels any in-flight reconnect wait and releases the native handle.
    pub async fn disconnect(&mut self) {
        if self.state.state() == GatewayState::Disconnected {
            return;
        }
        self.shutdown.notify_waiters();
        self.sdk.release().await;
        self.connected_at = None;
        self.state.transition(GatewayState::Disconnected, StateTransitionReason::ShutdownRequested);
    }

    /// Runs one reconnect attempt cycle: sleep for the current backoff
    /// interval, then attempt login. Returns `Ok(true)` on success,
    /// `Ok(false)` if this attempt failed and another should be scheduled,
    /// and `Err` only once `max_attempts` is exhausted.
    pub async fn attempt_reconnect(&mut self, ctp: &CtpConfig, connect_timeout_secs: f64) -> Result<bool, GatewayError> {
        self.state.transition(GatewayState::Reconnecting, StateTransitionReason::FrontDisconnected);

        self.reconnect_state.consecutive_failures += 1;
        if self.reconnect_state.consecutive_failures >= self.reconnect_config.alert_threshold {
            warn!(
                gateway_failures = self.reconnect_state.consecutive_failures,
                interval_secs = self.backoff.attempt(),
                "reconnect_alert_threshold_reached"
            );
        }

        let interval = self.backoff.next_interval_secs();
        tokio::select! {
            _ = tokio::time::sleep(StdDuration::from_secs_f64(interval)) => {}
            _ = self.shutdown.notified() => {
                return Ok(false);
            }
        }

        let login = self.sdk.login(&ctp.front_addr, &ctp.broker_id, &ctp.investor_id, &ctp.password);
        let timeout = StdDuration::from_secs_f64(connect_timeout_secs);

        match tokio::time::timeout(timeout, login).await {
            Ok(Ok(())) => {
                self.connected_at = Some(Utc::now());
                self.backoff.reset();
                self.reconnect_state.consecutive_failures = 0;
                self.state.transition(GatewayState::Connected, StateTransitionReason::ReconnectSuccess);
                Ok(true)
            }
            _ => {
                if self.reconnect_config.max_attempts > 0
                    && self.reconnect_state.consecutive_failures >= self.reconnect_config.max_attempts
                {
                    let mut ctx = std::collections::BTreeMap::new();
                    ctx.insert("attempt".to_string(), serde_json::json!(self.reconnect_state.consecutive_failures));
                    ctx.insert("interval_secs".to_string(), serde_json::json!(interval));
                    self.state.transition(GatewayState::Error, StateTransitionReason::ReconnectExhausted);
                    return Err(GatewayError::new("reconnect attempts exhausted", GatewayErrorKind::ReconnectExhausted)
                        .with_context(ctx));
                }
                Ok(false)
            }
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.reconnect_state.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_matches_exact_documented_sequence() {
        let config = ReconnectConfig {
            initial_interval: 1.0,
            max_interval: 60.0,
            multiplier: 2.0,
            max_attempts: 0,
            alert_threshold: 10,
        };
        let mut backoff = BackoffCalculator::new(config);
        let seq: Vec<f64> = (0..10).map(|_| backoff.next_interval_secs()).collect();
        assert_eq!(seq, vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 60.0, 60.0, 60.0, 60.0]);
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let config = ReconnectConfig::default();
        let mut backoff = BackoffCalculator::new(config);
        backoff.next_interval_secs();
        backoff.next_interval_secs();
        backoff.reset();
        assert_eq!(backoff.next_interval_secs(), 1.0);
    }

    #[tokio::test]
    async fn connect_is_idempotent_when_already_running() {
        use super::super::sdk::NullSdk;
        let sdk = Arc::new(NullSdk);
        let state = Arc::new(SessionStateMachine::new());
        state.transition(GatewayState::Connecting, StateTransitionReason::Started);
        state.transition(GatewayState::Connected, StateTransitionReason::ConnectSuccess);
        state.transition(GatewayState::Subscribing, StateTransitionReason::ConnectSuccess);
        state.transition(GatewayState::Running, StateTransitionReason::SubscribeSuccess);

        let mut manager = ConnectionManager::new(sdk, state.clone(), ReconnectConfig::default());
        let ctp = CtpConfig {
            broker_id: "9999".to_string(),
            investor_id: "1".to_string(),
            password: "x".to_string(),
            front_addr: "tcp://127.0.0.1:10211".to_string(),
            auth_code: String::new(),
            app_id: String::new(),
        };
        manager.connect(&ctp, 10.0).await.unwrap();
        assert_eq!(state.state(), GatewayState::Running);
    }
}
