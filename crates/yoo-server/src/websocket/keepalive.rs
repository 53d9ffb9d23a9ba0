//! Per-connection liveness windows and the keepalive monitor.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::client::{Client, DisconnectReason};

/// Consecutive missed pong windows for one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Liveness {
    pong_seen: bool,
    missed: u32,
}

impl Liveness {
    /// Fresh record. The upgrade itself counts as activity.
    pub fn new() -> Self {
        Self {
            pong_seen: true,
            missed: 0,
        }
    }

    /// A pong arrived in the current window.
    pub fn record_pong(&mut self) {
        self.pong_seen = true;
    }

    /// Close the current window and open the next one.
    ///
    /// Resets the counter if a pong was seen, otherwise increments it.
    /// Returns the updated count.
    pub fn close_window(&mut self) -> u32 {
        if self.pong_seen {
            self.missed = 0;
        } else {
            self.missed = self.missed.saturating_add(1);
        }
        self.pong_seen = false;
        self.missed
    }

    /// Consecutive missed windows.
    pub fn missed(&self) -> u32 {
        self.missed
    }

    /// Whether `limit` consecutive windows have been missed.
    pub fn limit_reached(&self, limit: u32) -> bool {
        self.missed >= limit
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Why the monitor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveExit {
    /// The client was no longer connected at a tick.
    Disconnected,
    /// The connection token was cancelled.
    Cancelled,
}

/// Close a liveness window on `client` every `interval` until it disconnects.
///
/// Windows close at `start + interval / 2 + k * interval`, half an interval
/// away from the send loop's ticks, which run at `start + k * interval`. An
/// update tick therefore always reads the count from the window that closed
/// before it. The monitor never decides to disconnect; the send loop reads
/// the counter. On exit it runs the idempotent disconnect, which is a no-op
/// unless the server is shutting down.
pub async fn run_keepalive(
    client: Arc<Client>,
    start: Instant,
    interval: Duration,
    cancel: CancellationToken,
) -> KeepAliveExit {
    let mut ticker = time::interval_at(start + interval / 2, interval);

    let exit = loop {
        tokio::select! {
            _ = ticker.tick() => {
                match client.close_window().await {
                    Some(0) => {}
                    Some(missed) => debug!(missed, "pong window missed"),
                    None => break KeepAliveExit::Disconnected,
                }
            }
            () = cancel.cancelled() => break KeepAliveExit::Cancelled,
        }
    };

    let reason = if cancel.is_cancelled() {
        DisconnectReason::ServerShutdown
    } else {
        DisconnectReason::SessionEnded
    };
    let _ = client.disconnect(reason).await;
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::client::ConnectionPhase;
    use crate::websocket::testing::connected_client;

    #[test]
    fn fresh_window_counts_as_alive() {
        let mut l = Liveness::new();
        assert_eq!(l.close_window(), 0);
    }

    #[test]
    fn silent_windows_accumulate() {
        let mut l = Liveness::new();
        let _ = l.close_window();
        assert_eq!(l.close_window(), 1);
        assert_eq!(l.close_window(), 2);
        assert!(l.limit_reached(2));
        assert!(!l.limit_reached(3));
    }

    #[test]
    fn pong_resets_counter() {
        let mut l = Liveness::new();
        let _ = l.close_window();
        let _ = l.close_window();
        assert_eq!(l.missed(), 1);
        l.record_pong();
        assert_eq!(l.close_window(), 0);
        assert_eq!(l.missed(), 0);
    }

    #[test]
    fn multiple_pongs_in_one_window_count_once() {
        let mut l = Liveness::new();
        let _ = l.close_window();
        l.record_pong();
        l.record_pong();
        assert_eq!(l.close_window(), 0);
        assert_eq!(l.close_window(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_counts_missed_windows() {
        let (client, _registry, _transport, cancel) = connected_client("alice").await;

        let monitor = tokio::spawn(run_keepalive(
            client.clone(),
            Instant::now(),
            Duration::from_secs(5),
            cancel.clone(),
        ));

        // Windows close at +2.5s (alive), +7.5s, +12.5s.
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(client.missed_pongs().await, 1);
        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(client.missed_pongs().await, 2);

        cancel.cancel();
        assert_eq!(monitor.await.unwrap(), KeepAliveExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_observes_pongs() {
        let (client, _registry, _transport, cancel) = connected_client("bob").await;

        let monitor = tokio::spawn(run_keepalive(
            client.clone(),
            Instant::now(),
            Duration::from_secs(5),
            cancel.clone(),
        ));

        // One pong between each pair of window closes.
        for _ in 0..4 {
            time::sleep(Duration::from_secs(1)).await;
            client.record_pong().await;
            time::sleep(Duration::from_secs(4)).await;
        }
        assert_eq!(client.missed_pongs().await, 0);
        assert!(client.is_connected().await);

        cancel.cancel();
        let _ = monitor.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_exits_when_client_disconnects() {
        let (client, registry, transport, cancel) = connected_client("carol").await;

        let monitor = tokio::spawn(run_keepalive(
            client.clone(),
            Instant::now(),
            Duration::from_secs(1),
            CancellationToken::new(),
        ));

        assert!(client.disconnect(DisconnectReason::ClientClosed).await);
        assert!(cancel.is_cancelled());

        assert_eq!(monitor.await.unwrap(), KeepAliveExit::Disconnected);
        // The exit-path disconnect was a no-op.
        assert_eq!(transport.close_count(), 1);
        assert_eq!(client.disconnect_reason().await, Some(DisconnectReason::ClientClosed));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancel_disconnects_client() {
        let (client, registry, transport, cancel) = connected_client("dave").await;

        let monitor = tokio::spawn(run_keepalive(
            client.clone(),
            Instant::now(),
            Duration::from_secs(5),
            cancel.clone(),
        ));

        // Cancelled from outside (e.g., the parent shutdown token).
        cancel.cancel();
        assert_eq!(monitor.await.unwrap(), KeepAliveExit::Cancelled);
        assert_eq!(client.phase().await, ConnectionPhase::Disconnected);
        assert_eq!(client.disconnect_reason().await, Some(DisconnectReason::ServerShutdown));
        assert_eq!(transport.close_count(), 1);
        assert!(registry.is_empty());
    }
}
