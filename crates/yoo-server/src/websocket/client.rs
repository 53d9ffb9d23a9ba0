//! Pooled client state and the disconnection protocol.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use tokio::sync::Mutex;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use yoo_auth::UserId;

use super::keepalive::Liveness;
use super::registry::ConnectionRegistry;
use super::transport::Transport;
use crate::error::PoolError;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Registry key: a pool slot plus the generation of its current occupant.
///
/// The generation is bumped on every release, so a key held by a finished
/// session never matches the slot's next session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClientKey {
    /// Pool slot index.
    pub slot: usize,
    /// Reuse generation of the slot.
    pub generation: u64,
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.slot, self.generation)
    }
}

/// Connection state machine. Transitions only happen under the client lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Pooled, not activated.
    Idle,
    /// Registered and serving.
    Connected,
    /// Teardown in progress.
    Disconnecting,
    /// Torn down; terminal until released.
    Disconnected,
}

/// Why a connection was torn down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed the connection or the stream ended.
    ClientClosed,
    /// Too many consecutive pong windows were missed.
    Unresponsive,
    /// Reading or writing the transport failed.
    TransportError,
    /// The session ended for any other reason.
    SessionEnded,
    /// The server is shutting down.
    ServerShutdown,
}

impl DisconnectReason {
    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::Unresponsive => "unresponsive",
            Self::TransportError => "transport_error",
            Self::SessionEnded => "session_ended",
            Self::ServerShutdown => "server_shutdown",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the update tick's liveness check.
pub enum LivenessCheck {
    /// The client is no longer connected.
    Disconnected,
    /// The missed-pong limit has been reached.
    Unresponsive {
        /// Consecutive missed windows.
        missed: u32,
    },
    /// Connected and responsive; payloads go out through this transport.
    Ready(Arc<dyn Transport>),
}

impl fmt::Debug for LivenessCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("Disconnected"),
            Self::Unresponsive { missed } => f
                .debug_struct("Unresponsive")
                .field("missed", missed)
                .finish(),
            Self::Ready(_) => f.write_str("Ready"),
        }
    }
}

struct ClientState {
    phase: ConnectionPhase,
    generation: u64,
    user_id: Option<UserId>,
    transport: Option<Arc<dyn Transport>>,
    liveness: Liveness,
    cancel: CancellationToken,
    connected_at: Option<Instant>,
    reason: Option<DisconnectReason>,
}

impl ClientState {
    fn idle(generation: u64) -> Self {
        Self {
            phase: ConnectionPhase::Idle,
            generation,
            user_id: None,
            transport: None,
            liveness: Liveness::new(),
            cancel: CancellationToken::new(),
            connected_at: None,
            reason: None,
        }
    }
}

/// One logical connected user, living in a fixed pool slot.
///
/// All mutable fields sit behind a single async lock. A client is in the
/// registry iff its phase is [`ConnectionPhase::Connected`].
pub struct Client {
    slot: usize,
    registry: Arc<ConnectionRegistry>,
    close_timeout: Duration,
    state: Mutex<ClientState>,
}

impl Client {
    pub(crate) fn new(slot: usize, registry: Arc<ConnectionRegistry>, close_timeout: Duration) -> Self {
        Self {
            slot,
            registry,
            close_timeout,
            state: Mutex::new(ClientState::idle(0)),
        }
    }

    /// Pool slot index.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Current registry key.
    pub async fn key(&self) -> ClientKey {
        let state = self.state.lock().await;
        self.key_for(&state)
    }

    fn key_for(&self, state: &ClientState) -> ClientKey {
        ClientKey {
            slot: self.slot,
            generation: state.generation,
        }
    }

    /// Current phase.
    pub async fn phase(&self) -> ConnectionPhase {
        self.state.lock().await.phase
    }

    /// Whether the client is connected.
    pub async fn is_connected(&self) -> bool {
        self.phase().await == ConnectionPhase::Connected
    }

    /// Identity of the current occupant.
    pub async fn user_id(&self) -> Option<UserId> {
        self.state.lock().await.user_id.clone()
    }

    /// Consecutive missed pong windows.
    pub async fn missed_pongs(&self) -> u32 {
        self.state.lock().await.liveness.missed()
    }

    /// Reason recorded by the disconnect that tore this session down.
    pub async fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.state.lock().await.reason
    }

    /// Populate an idle client and register it, atomically under its lock.
    ///
    /// `cancel` becomes the connection-scoped token observed by every task of
    /// the session.
    pub async fn activate(
        self: &Arc<Self>,
        user_id: UserId,
        transport: Arc<dyn Transport>,
        cancel: CancellationToken,
    ) -> Result<ClientKey, PoolError> {
        let mut state = self.state.lock().await;
        if state.phase != ConnectionPhase::Idle {
            return Err(PoolError::NotIdle { slot: self.slot });
        }

        state.user_id = Some(user_id);
        state.transport = Some(transport);
        state.liveness = Liveness::new();
        state.cancel = cancel;
        state.connected_at = Some(Instant::now());
        state.reason = None;
        state.phase = ConnectionPhase::Connected;

        let key = self.key_for(&state);
        let _ = self.registry.register(key, Arc::clone(self));

        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        Ok(key)
    }

    /// Record a pong in the current liveness window.
    pub async fn record_pong(&self) {
        let mut state = self.state.lock().await;
        if state.phase == ConnectionPhase::Connected {
            state.liveness.record_pong();
        }
    }

    /// Close the current liveness window. `None` once disconnected.
    pub async fn close_window(&self) -> Option<u32> {
        let mut state = self.state.lock().await;
        if state.phase != ConnectionPhase::Connected {
            return None;
        }
        Some(state.liveness.close_window())
    }

    /// Check connectivity and the missed-pong `limit` in one step.
    pub async fn check_liveness(&self, limit: u32) -> LivenessCheck {
        let state = self.state.lock().await;
        if state.phase != ConnectionPhase::Connected {
            return LivenessCheck::Disconnected;
        }
        if state.liveness.limit_reached(limit) {
            return LivenessCheck::Unresponsive {
                missed: state.liveness.missed(),
            };
        }
        match &state.transport {
            Some(transport) => LivenessCheck::Ready(Arc::clone(transport)),
            None => LivenessCheck::Disconnected,
        }
    }

    /// Transport of a connected client.
    pub async fn transport(&self) -> Option<Arc<dyn Transport>> {
        let state = self.state.lock().await;
        if state.phase != ConnectionPhase::Connected {
            return None;
        }
        state.transport.clone()
    }

    /// Tear the connection down. Idempotent and safe to race.
    ///
    /// Exactly one call per session unregisters, cancels the connection
    /// token, and closes the transport; it returns `true`. Every other call
    /// returns `false`.
    pub async fn disconnect(&self, reason: DisconnectReason) -> bool {
        let mut state = self.state.lock().await;
        let key = self.key_for(&state);

        if state.phase != ConnectionPhase::Connected {
            debug!(client_key = %key, %reason, phase = ?state.phase, "already disconnected");
            return false;
        }

        state.phase = ConnectionPhase::Disconnecting;
        let _ = self.registry.unregister(&key);
        state.cancel.cancel();

        if let Some(transport) = state.transport.take() {
            match time::timeout(self.close_timeout, transport.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(client_key = %key, error = %err, "error closing connection"),
                Err(_) => warn!(client_key = %key, timeout = ?self.close_timeout, "timed out closing connection"),
            }
        }

        state.phase = ConnectionPhase::Disconnected;
        state.reason = Some(reason);

        let lifetime = state.connected_at.map(|t| t.elapsed()).unwrap_or_default();
        counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(lifetime.as_secs_f64());

        let user_id = state.user_id.as_ref().map_or("", UserId::as_str);
        info!(
            client_key = %key,
            user_id,
            %reason,
            lifetime_secs = lifetime.as_secs(),
            "client disconnected"
        );
        true
    }

    /// Return to idle with a new generation. Rejected while connected.
    pub(crate) async fn reset(&self) -> Result<(), PoolError> {
        let mut state = self.state.lock().await;
        let key = self.key_for(&state);
        if state.phase == ConnectionPhase::Connected || self.registry.contains(&key) {
            return Err(PoolError::StillConnected { slot: self.slot });
        }
        *state = ClientState::idle(state.generation.wrapping_add(1));
        Ok(())
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::testing::{MockTransport, connected_client};
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn activation_registers() {
        let (client, registry, _transport, _cancel) = connected_client("alice").await;
        let key = client.key().await;
        assert!(registry.contains(&key));
        assert_eq!(client.phase().await, ConnectionPhase::Connected);
        assert_eq!(client.user_id().await.unwrap().as_str(), "alice");
    }

    #[tokio::test]
    async fn activate_twice_rejected() {
        let (client, _registry, _transport, _cancel) = connected_client("alice").await;
        let again = client
            .activate(
                UserId::new("mallory").unwrap(),
                MockTransport::new(),
                CancellationToken::new(),
            )
            .await;
        assert_matches!(again, Err(PoolError::NotIdle { .. }));
        assert_eq!(client.user_id().await.unwrap().as_str(), "alice");
    }

    #[tokio::test]
    async fn disconnect_runs_protocol_once() {
        let (client, registry, transport, cancel) = connected_client("bob").await;

        assert!(client.disconnect(DisconnectReason::Unresponsive).await);
        assert!(!client.disconnect(DisconnectReason::ClientClosed).await);

        assert!(registry.is_empty());
        assert!(cancel.is_cancelled());
        assert_eq!(transport.close_count(), 1);
        assert_eq!(client.phase().await, ConnectionPhase::Disconnected);
        assert_eq!(client.disconnect_reason().await, Some(DisconnectReason::Unresponsive));
    }

    #[tokio::test]
    async fn repeat_disconnect_logs_at_debug() {
        let (logs, _guard) = yoo_logging::capture_logs();
        let (client, _registry, _transport, _cancel) = connected_client("bob").await;

        assert!(client.disconnect(DisconnectReason::ClientClosed).await);
        assert!(!client.disconnect(DisconnectReason::SessionEnded).await);

        assert!(logs.has_event(tracing::Level::INFO, "client disconnected"));
        assert!(logs.has_event(tracing::Level::DEBUG, "already disconnected"));
    }

    #[tokio::test]
    async fn close_error_is_swallowed() {
        let (logs, _guard) = yoo_logging::capture_logs();
        let (client, registry, transport, _cancel) = connected_client("carol").await;
        transport.fail_close();

        assert!(client.disconnect(DisconnectReason::TransportError).await);
        assert!(registry.is_empty());
        assert_eq!(client.phase().await, ConnectionPhase::Disconnected);
        assert!(logs.has_event(tracing::Level::WARN, "error closing connection"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_disconnects_close_once() {
        let (client, registry, transport, _cancel) = connected_client("dave").await;

        let reasons = [
            DisconnectReason::ClientClosed,
            DisconnectReason::Unresponsive,
            DisconnectReason::TransportError,
            DisconnectReason::SessionEnded,
        ];
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let client = client.clone();
                let reason = reasons[i % reasons.len()];
                tokio::spawn(async move { client.disconnect(reason).await })
            })
            .collect();

        let mut transitions = 0;
        for handle in handles {
            if handle.await.unwrap() {
                transitions += 1;
            }
        }

        assert_eq!(transitions, 1);
        assert_eq!(transport.close_count(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn pong_only_counts_while_connected() {
        let (client, _registry, _transport, _cancel) = connected_client("erin").await;
        assert!(client.disconnect(DisconnectReason::ClientClosed).await);
        client.record_pong().await;
        assert_eq!(client.close_window().await, None);
    }

    #[tokio::test]
    async fn unresponsive_on_third_update_tick() {
        let (client, _registry, _transport, _cancel) = connected_client("frank").await;

        // First window closes half an interval in.
        assert_eq!(client.close_window().await, Some(0));

        let mut outcomes = Vec::new();
        for _ in 0..3 {
            // Update tick reads the counter, then the next window closes.
            outcomes.push(client.check_liveness(2).await);
            let _ = client.close_window().await;
        }

        assert_matches!(outcomes[0], LivenessCheck::Ready(_));
        assert_matches!(outcomes[1], LivenessCheck::Ready(_));
        assert_matches!(outcomes[2], LivenessCheck::Unresponsive { missed: 2 });
    }

    #[tokio::test]
    async fn pong_keeps_check_ready() {
        let (client, _registry, _transport, _cancel) = connected_client("grace").await;
        for _ in 0..10 {
            client.record_pong().await;
            let _ = client.close_window().await;
            assert_matches!(client.check_liveness(2).await, LivenessCheck::Ready(_));
        }
    }

    #[tokio::test]
    async fn check_after_disconnect() {
        let (client, _registry, _transport, _cancel) = connected_client("heidi").await;
        let _ = client.disconnect(DisconnectReason::SessionEnded).await;
        assert_matches!(client.check_liveness(2).await, LivenessCheck::Disconnected);
        assert!(client.transport().await.is_none());
    }

    #[tokio::test]
    async fn reset_rejected_while_connected() {
        let (client, _registry, _transport, _cancel) = connected_client("ivan").await;
        assert_matches!(client.reset().await, Err(PoolError::StillConnected { .. }));
    }

    #[tokio::test]
    async fn reset_bumps_generation() {
        let (client, _registry, _transport, _cancel) = connected_client("judy").await;
        let before = client.key().await;
        let _ = client.disconnect(DisconnectReason::ClientClosed).await;
        client.reset().await.unwrap();

        let after = client.key().await;
        assert_eq!(after.slot, before.slot);
        assert_eq!(after.generation, before.generation + 1);
        assert_eq!(client.phase().await, ConnectionPhase::Idle);
        assert!(client.user_id().await.is_none());
        assert_eq!(client.disconnect_reason().await, None);
    }

    #[test]
    fn key_display() {
        let key = ClientKey {
            slot: 4,
            generation: 2,
        };
        assert_eq!(key.to_string(), "4#2");
    }

    #[test]
    fn reason_labels() {
        assert_eq!(DisconnectReason::Unresponsive.to_string(), "unresponsive");
        assert_eq!(DisconnectReason::ServerShutdown.as_str(), "server_shutdown");
    }
}
