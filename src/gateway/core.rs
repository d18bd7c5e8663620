//! Top-level `Gateway`: owns every other component and is the single task
//! all cross-component orchestration serializes on (reconnect triggers,
//! subscription restore, state transitions). No method here spawns a task
//! of its own; the embedding application drives `run`/`next_tick` from its
//! own dispatch loop.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::sync::mpsc;
use tracing::warn;

use super::config::GatewayConfig;
use super::connection::ConnectionManager;
use super::error::{GatewayError, GatewayErrorKind};
use super::ingest::{IngestPipeline, IngestOutcome, RawTickReceiver};
use super::metrics::{GatewayMetrics, GatewayMetricsSnapshot};
use super::models::{Bar, Depth, Tick};
use super::sdk::{NativeSdk, RawTick};
use super::state::{GatewayState, SessionStateMachine, StateTransitionReason};
use super::subscription::SubscriptionRegistry;

/// Composes session state, connection management, subscriptions, ingest
/// and metrics into the gateway's public surface.
pub struct Gateway {
    config: GatewayConfig,
    sdk: Arc<dyn NativeSdk>,
    state: Arc<SessionStateMachine>,
    connection: ConnectionManager,
    subscriptions: SubscriptionRegistry,
    ingest: IngestPipeline,
    tick_rx: mpsc::Receiver<Tick>,
    metrics: Arc<GatewayMetrics>,
}

impl Gateway {
    pub fn new(config: GatewayConfig, sdk: Arc<dyn NativeSdk>) -> Self {
        let state = Arc::new(SessionStateMachine::new());
        let metrics = Arc::new(GatewayMetrics::new());
        let connection = ConnectionManager::new(sdk.clone(), state.clone(), config.reconnect.clone());
        let subscriptions = SubscriptionRegistry::new(Default::default(), config.max_subscriptions);
        let queue_capacity = super::ingest::DEFAULT_QUEUE_CAPACITY;
        let cache_capacity = super::ingest::DEFAULT_CACHE_CAPACITY;
        let (ingest, tick_rx) = IngestPipeline::new(
            config.gateway_name.clone(),
            config.data_filter.clone(),
            queue_capacity,
            cache_capacity,
            metrics.clone(),
        );

        Self {
            config,
            sdk,
            state,
            connection,
            subscriptions,
            ingest,
            tick_rx,
            metrics,
        }
    }

    pub fn state(&self) -> GatewayState {
        self.state.state()
    }

    /// Mirrors the front-end connection, not just the login handshake:
    /// true once `connect` has succeeded and until `disconnect`/a front
    /// drop moves the state machine away from this set.
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state.state(),
            GatewayState::Connected | GatewayState::Subscribing | GatewayState::Running
        )
    }

    pub fn on_state_change<F>(&self, listener: F)
    where
        F: Fn(GatewayState, GatewayState) + Send + Sync + 'static,
    {
        self.state.on_state_change(listener);
    }

    pub fn on_tick<F>(&mut self, callback: F)
    where
        F: Fn(&Tick) + Send + Sync + 'static,
    {
        self.ingest.on_tick(callback);
    }

    pub fn on_bar<F>(&mut self, callback: F)
    where
        F: Fn(&Bar) + Send + Sync + 'static,
    {
        self.ingest.on_bar(callback);
    }

    pub fn on_depth<F>(&mut self, callback: F)
    where
        F: Fn(&Depth) + Send + Sync + 'static,
    {
        self.ingest.on_depth(callback);
    }

    fn ctp_config(&self) -> Result<super::config::CtpConfig, GatewayError> {
        self.config.ctp.clone().ok_or_else(|| {
            GatewayError::new("ctp configuration required to connect", GatewayErrorKind::DataValidationFailed)
        })
    }

    /// Brings the native SDK up and logs in. Does not itself transition to
    /// RUNNING; that happens on the first successful `subscribe`.
    pub async fn connect(&mut self) -> Result<(), GatewayError> {
        let ctp = self.ctp_config()?;
        self.connection.connect(&ctp, self.config.connect_timeout_secs).await
    }

    pub async fn disconnect(&mut self) {
        self.connection.disconnect().await;
        self.state.transition(GatewayState::Stopped, StateTransitionReason::ShutdownRequested);
    }

    /// Fails with `ConnectionLost` unless already connected. Otherwise
    /// transitions to SUBSCRIBING unconditionally, expands `patterns`,
    /// subscribes only the symbols not already held, and transitions back
    /// to RUNNING — whether or not there was anything new to subscribe. A
    /// subscription-limit breach leaves the registry and SDK untouched.
    pub async fn subscribe(&mut self, patterns: &[String]) -> Result<Vec<String>, GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::new("not connected", GatewayErrorKind::ConnectionLost));
        }

        self.state.transition(GatewayState::Subscribing, StateTransitionReason::ConnectSuccess);

        let new_symbols = self.subscriptions.plan_subscribe(patterns)?;
        if new_symbols.is_empty() {
            self.state.transition(GatewayState::Running, StateTransitionReason::SubscribeSuccess);
            return Ok(new_symbols);
        }

        for batch in SubscriptionRegistry::batches(&new_symbols) {
            self.sdk.subscribe_batch(batch).await.map_err(|e| {
                GatewayError::new("subscribe_batch failed", GatewayErrorKind::SubscriptionFailed).with_cause(e)
            })?;
            for symbol in batch {
                self.subscriptions.mark_subscribed(symbol);
            }
        }

        self.state.transition(GatewayState::Running, StateTransitionReason::SubscribeSuccess);
        Ok(new_symbols)
    }

    /// Expands `patterns`, unsubscribes the intersection with the currently
    /// subscribed set, and drops their aggregator/ordering state.
    pub async fn unsubscribe(&mut self, patterns: &[String]) -> Result<(), GatewayError> {
        let expanded = self.subscriptions.expand(patterns);
        let to_remove: Vec<String> = self
            .subscriptions
            .intersect_subscribed(&expanded)
            .into_iter()
            .cloned()
            .collect();
        if to_remove.is_empty() {
            return Ok(());
        }

        for batch in SubscriptionRegistry::batches(&to_remove) {
            self.sdk.unsubscribe_batch(batch).await.map_err(|e| {
                GatewayError::new("unsubscribe_batch failed", GatewayErrorKind::SubscriptionFailed).with_cause(e)
            })?;
        }

        self.subscriptions.mark_unsubscribed(&to_remove);
        for symbol in &to_remove {
            self.ingest.remove_symbol(symbol);
        }
        Ok(())
    }

    /// Runs the reconnect loop to completion (or exhaustion), then restores
    /// whatever was subscribed before the front disconnected. Meant to be
    /// invoked by the SDK's `OnFrontDisconnected` callback glue, on the
    /// same task as everything else here — never concurrently with itself.
    pub async fn handle_front_disconnected(&mut self) -> Result<(), GatewayError> {
        let ctp = self.ctp_config()?;
        loop {
            match self.connection.attempt_reconnect(&ctp, self.config.connect_timeout_secs).await {
                Ok(true) => {
                    self.metrics.record_reconnect(true);
                    break;
                }
                Ok(false) => {
                    self.metrics.record_reconnect(false);
                    continue;
                }
                Err(e) => {
                    self.metrics.record_reconnect(false);
                    return Err(e);
                }
            }
        }

        let snapshot = self.subscriptions.take_snapshot();
        if !snapshot.is_empty() {
            self.subscribe(&snapshot).await?;
        }
        Ok(())
    }

    /// Routes one raw SDK record through the ingest pipeline.
    pub fn ingest_raw(&mut self, raw: &RawTick) -> IngestOutcome {
        self.ingest.process_raw(raw)
    }

    /// Registers a fresh symbol's bar aggregators ahead of its first tick.
    /// `process_raw` also does this lazily, so calling it explicitly is
    /// only useful to pre-warm aggregators before traffic starts.
    pub fn init_symbol(&mut self, symbol: &str, exchange: super::models::Exchange) {
        self.ingest.init_symbol(symbol, exchange);
    }

    /// Polls the downstream tick queue with a 1-second timeout per
    /// iteration, returning `None` once the gateway has fully stopped.
    pub async fn next_tick(&mut self) -> Option<Tick> {
        loop {
            if self.state.state() == GatewayState::Stopped {
                return None;
            }
            match tokio::time::timeout(StdDuration::from_secs(1), self.tick_rx.recv()).await {
                Ok(Some(tick)) => {
                    self.ingest.queue_len_handle().fetch_sub(1, Ordering::Relaxed);
                    return Some(tick);
                }
                Ok(None) => return None,
                Err(_elapsed) => continue,
            }
        }
    }

    /// Drains raw SDK records onto the ingest pipeline until the channel
    /// closes or the gateway is stopped. Reconnect handling is out of band
    /// (see `handle_front_disconnected`) since it is not itself a raw tick.
    pub async fn run(&mut self, mut raw_rx: RawTickReceiver) {
        loop {
            if self.state.state() == GatewayState::Stopped {
                break;
            }
            match raw_rx.recv().await {
                Some((_symbol, _exchange, raw)) => {
                    self.ingest_raw(&raw);
                }
                None => {
                    warn!("raw_tick_channel_closed");
                    break;
                }
            }
        }
    }

    pub fn metrics_snapshot(&self) -> GatewayMetricsSnapshot {
        self.metrics.snapshot(self.state.state(), self.subscriptions.subscribed_count(), self.ingest.queue_len())
    }
}
