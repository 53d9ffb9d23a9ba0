//! Connection session: runs one authenticated client from activation
//! through disconnect and release.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, instrument, trace, warn};
use yoo_auth::UserId;

use super::client::{Client, DisconnectReason, LivenessCheck};
use super::keepalive::run_keepalive;
use super::pool::ClientPool;
use super::producer::{InboundPayload, MessageProducer};
use super::registry::ConnectionRegistry;
use super::transport::{InboundFrame, OutboundFrame, Transport};
use crate::config::ConnectionConfig;
use crate::error::TransportError;
use crate::metrics::WS_PINGS_SENT_TOTAL;
use crate::shutdown::ShutdownCoordinator;

/// Owns the pool and registry and runs sessions over them.
pub struct ConnectionHandler {
    pool: ClientPool,
    registry: Arc<ConnectionRegistry>,
    producer: Arc<dyn MessageProducer>,
    shutdown: Arc<ShutdownCoordinator>,
    config: ConnectionConfig,
}

impl ConnectionHandler {
    /// Create a handler with an empty pool and registry.
    pub fn new(
        config: ConnectionConfig,
        producer: Arc<dyn MessageProducer>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            pool: ClientPool::new(Arc::clone(&registry), config.close_timeout),
            registry,
            producer,
            shutdown,
            config,
        }
    }

    /// Connected clients.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Client pool.
    pub fn pool(&self) -> &ClientPool {
        &self.pool
    }

    /// Per-connection timers and limits.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Run a session for `user_id` until it disconnects.
    ///
    /// 1. Acquires and activates a pooled client
    /// 2. Spawns the receiver and the keepalive monitor
    /// 3. Runs the send loop (update and ping ticks) on this task
    /// 4. Disconnects, joins the spawned tasks, and releases the client
    ///
    /// Returns the reason recorded by whichever path disconnected first.
    #[instrument(skip_all, fields(user_id = %user_id, client_key = tracing::field::Empty))]
    pub async fn run<S>(
        &self,
        user_id: UserId,
        transport: Arc<dyn Transport>,
        inbound: S,
    ) -> Option<DisconnectReason>
    where
        S: Stream<Item = Result<InboundFrame, TransportError>> + Send + Unpin + 'static,
    {
        let client = self.pool.acquire();
        let cancel = self.shutdown.child_token();

        let key = match client
            .activate(user_id.clone(), Arc::clone(&transport), cancel.clone())
            .await
        {
            Ok(key) => key,
            Err(err) => {
                error!(error = %err, "failed to activate pooled client");
                if let Err(err) = transport.close().await {
                    debug!(error = %err, "error closing rejected connection");
                }
                return None;
            }
        };
        let _ = Span::current().record("client_key", tracing::field::display(key));
        info!(connections = self.registry.len(), "client connected");

        let receiver = tokio::spawn(
            run_receiver(
                Arc::clone(&client),
                inbound,
                Arc::clone(&self.producer),
                user_id.clone(),
                cancel.clone(),
            )
            .in_current_span(),
        );
        // Both tickers count from here so their deadlines never coincide.
        let start = time::Instant::now();
        let monitor_client = Arc::clone(&client);
        let interval = self.config.ping_interval;
        let monitor_cancel = cancel.clone();
        let monitor = tokio::spawn(
            async move {
                let exit = run_keepalive(monitor_client, start, interval, monitor_cancel).await;
                debug!(?exit, "keepalive monitor stopped");
            }
            .in_current_span(),
        );

        let reason = self.send_loop(&client, &user_id, start, &cancel).await;
        let _ = client.disconnect(reason).await;

        join_tasks(vec![receiver, monitor], self.config.task_join_timeout).await;

        let recorded = client.disconnect_reason().await;
        if let Err(err) = self.pool.release(&client).await {
            error!(error = %err, "failed to release client");
        }
        recorded
    }

    async fn send_loop(
        &self,
        client: &Client,
        user_id: &UserId,
        start: time::Instant,
        cancel: &CancellationToken,
    ) -> DisconnectReason {
        let limit = self.config.max_missed_pongs;
        let update_every = self.config.update_interval;
        let ping_every = self.config.ping_interval;
        let mut updates = time::interval_at(start + update_every, update_every);
        let mut pings = time::interval_at(start + ping_every, ping_every);

        loop {
            tokio::select! {
                () = cancel.cancelled() => return DisconnectReason::ServerShutdown,
                _ = updates.tick() => {
                    let transport = match client.check_liveness(limit).await {
                        LivenessCheck::Ready(transport) => transport,
                        LivenessCheck::Disconnected => return DisconnectReason::SessionEnded,
                        LivenessCheck::Unresponsive { missed } => {
                            warn!(missed, limit, "client unresponsive, disconnecting");
                            return DisconnectReason::Unresponsive;
                        }
                    };
                    match self.producer.produce(user_id).await {
                        Ok(Some(text)) => {
                            if let Err(err) = self.send(transport.as_ref(), OutboundFrame::Text(text)).await {
                                warn!(error = %err, "failed to send update");
                                return DisconnectReason::TransportError;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => warn!(error = %err, "producer failed"),
                    }
                }
                _ = pings.tick() => {
                    let Some(transport) = client.transport().await else {
                        return DisconnectReason::SessionEnded;
                    };
                    if let Err(err) = self.send(transport.as_ref(), OutboundFrame::Ping).await {
                        warn!(error = %err, "failed to send ping");
                        return DisconnectReason::TransportError;
                    }
                    counter!(WS_PINGS_SENT_TOTAL).increment(1);
                    trace!("sent ping");
                }
            }
        }
    }

    async fn send(&self, transport: &dyn Transport, frame: OutboundFrame) -> Result<(), TransportError> {
        time::timeout(self.config.send_timeout(), transport.send(frame))
            .await
            .unwrap_or(Err(TransportError::Timeout))
    }
}

/// Read inbound frames until the peer leaves or the session is cancelled.
async fn run_receiver<S>(
    client: Arc<Client>,
    mut inbound: S,
    producer: Arc<dyn MessageProducer>,
    user_id: UserId,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<InboundFrame, TransportError>> + Send + Unpin,
{
    let reason = loop {
        tokio::select! {
            () = cancel.cancelled() => break DisconnectReason::ServerShutdown,
            frame = inbound.next() => match frame {
                Some(Ok(InboundFrame::Pong)) => client.record_pong().await,
                Some(Ok(InboundFrame::Text(text))) => {
                    producer.on_message(&user_id, InboundPayload::Text(text)).await;
                }
                Some(Ok(InboundFrame::Binary(data))) => {
                    producer.on_message(&user_id, InboundPayload::Binary(data)).await;
                }
                Some(Ok(InboundFrame::Ping)) => {}
                Some(Ok(InboundFrame::Close)) | None => break DisconnectReason::ClientClosed,
                Some(Err(err)) => {
                    debug!(error = %err, "read failed");
                    break DisconnectReason::TransportError;
                }
            },
        }
    };
    let _ = client.disconnect(reason).await;
}

/// Wait for session tasks, aborting any still running at the deadline.
async fn join_tasks(handles: Vec<JoinHandle<()>>, timeout: Duration) {
    let deadline = time::Instant::now() + timeout;
    for mut handle in handles {
        if time::timeout_at(deadline, &mut handle).await.is_err() {
            warn!(?timeout, "session task did not finish in time, aborting");
            handle.abort();
            let _ = handle.await;
        }
    }
}
