//! Session state machine.
//!
//! States and legal transitions:
//! `DISCONNECTED -> CONNECTING -> CONNECTED -> SUBSCRIBING -> RUNNING`,
//! with `ERROR` reachable from the first three and `RECONNECTING` looping
//! back to `CONNECTED` from `RUNNING`. Any state may transition to the
//! terminal `STOPPED` via `disconnect()`. Transitions fire all registered
//! listeners in registration order; self-transitions are suppressed and a
//! panicking listener does not block the others or the transition itself.

use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::RwLock;
use tracing::{error, info};

/// Gateway lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    Disconnected,
    Connecting,
    Connected,
    Subscribing,
    Running,
    Reconnecting,
    Error,
    Stopped,
}

impl GatewayState {
    /// Ordinal used for the `gateway_state` gauge (0..7).
    pub fn ordinal(&self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Subscribing => 3,
            Self::Running => 4,
            Self::Reconnecting => 5,
            Self::Error => 6,
            Self::Stopped => 7,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Subscribing => "SUBSCRIBING",
            Self::Running => "RUNNING",
            Self::Reconnecting => "RECONNECTING",
            Self::Error => "ERROR",
            Self::Stopped => "STOPPED",
        }
    }
}

impl std::fmt::Display for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Why a transition happened, carried through for logging/metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransitionReason {
    Started,
    ConnectSuccess,
    SubscribeSuccess,
    ConnectTimeout,
    AuthFailed,
    ConnectFailed,
    FrontDisconnected,
    ReconnectSuccess,
    ReconnectExhausted,
    ShutdownRequested,
}

impl std::fmt::Display for StateTransitionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Started => "started",
            Self::ConnectSuccess => "connect_ok",
            Self::SubscribeSuccess => "subscribe_ok",
            Self::ConnectTimeout => "connect_timeout",
            Self::AuthFailed => "auth_failed",
            Self::ConnectFailed => "connect_failed",
            Self::FrontDisconnected => "front_disconnected",
            Self::ReconnectSuccess => "reconnect_ok",
            Self::ReconnectExhausted => "reconnect_exhausted",
            Self::ShutdownRequested => "shutdown",
        };
        write!(f, "{}", s)
    }
}

type Listener = Box<dyn Fn(GatewayState, GatewayState) + Send + Sync>;

/// Owns the current state and the ordered list of state-change listeners.
///
/// Intended to be driven exclusively from the dispatch loop (see
/// `gateway::ingest`); the inner lock exists only so constructors can hand
/// out shared references, not to support concurrent mutation.
pub struct SessionStateMachine {
    state: RwLock<GatewayState>,
    listeners: RwLock<Vec<Listener>>,
}

impl std::fmt::Debug for SessionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStateMachine")
            .field("state", &*self.state.read())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl std::fmt::Display for SessionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionStateMachine(state={}, listeners={})", self.state(), self.listeners.read().len())
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GatewayState::Disconnected),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn state(&self) -> GatewayState {
        *self.state.read()
    }

    /// Registers a state-change listener, invoked in registration order on
    /// every future non-suppressed transition.
    pub fn on_state_change<F>(&self, listener: F)
    where
        F: Fn(GatewayState, GatewayState) + Send + Sync + 'static,
    {
        self.listeners.write().push(Box::new(listener));
    }

    /// Transitions to `new_state`. Self-transitions are suppressed. A
    /// listener that panics is caught and logged; it neither blocks later
    /// listeners nor aborts the transition itself.
    pub fn transition(&self, new_state: GatewayState, reason: StateTransitionReason) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            if old == new_state {
                return;
            }
            *state = new_state;
            old
        };

        info!(from = %old_state, to = %new_state, reason = %reason, "gateway_state_transition");

        for listener in self.listeners.read().iter() {
            let result = catch_unwind(AssertUnwindSafe(|| listener(old_state, new_state)));
            if let Err(panic) = result {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!(error = %msg, "state_change_listener_panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn transitions_follow_the_legal_path() {
        let sm = SessionStateMachine::new();
        assert_eq!(sm.state(), GatewayState::Disconnected);

        sm.transition(GatewayState::Connecting, StateTransitionReason::Started);
        assert_eq!(sm.state(), GatewayState::Connecting);

        sm.transition(GatewayState::Connected, StateTransitionReason::ConnectSuccess);
        sm.transition(GatewayState::Subscribing, StateTransitionReason::ConnectSuccess);
        sm.transition(GatewayState::Running, StateTransitionReason::SubscribeSuccess);
        assert_eq!(sm.state(), GatewayState::Running);
    }

    #[test]
    fn self_transitions_are_suppressed() {
        let sm = SessionStateMachine::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        sm.on_state_change(move |_, _| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });

        sm.transition(GatewayState::Disconnected, StateTransitionReason::Started);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        sm.transition(GatewayState::Connecting, StateTransitionReason::Started);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listeners_fire_in_registration_order() {
        let sm = SessionStateMachine::new();
        let order = Arc::new(RwLock::new(Vec::new()));
        for id in 0..3 {
            let order = order.clone();
            sm.on_state_change(move |_, _| order.write().push(id));
        }
        sm.transition(GatewayState::Connecting, StateTransitionReason::Started);
        assert_eq!(*order.read(), vec![0, 1, 2]);
    }

    #[test]
    fn panicking_listener_does_not_block_later_listeners() {
        let sm = SessionStateMachine::new();
        let saw_second = Arc::new(AtomicUsize::new(0));
        let saw_second2 = saw_second.clone();

        sm.on_state_change(|_, _| panic!("boom"));
        sm.on_state_change(move |_, _| {
            saw_second2.fetch_add(1, Ordering::SeqCst);
        });

        sm.transition(GatewayState::Connecting, StateTransitionReason::Started);
        assert_eq!(saw_second.load(Ordering::SeqCst), 1);
        assert_eq!(sm.state(), GatewayState::Connecting);
    }
}
