//! Test doubles for the transport seam.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use yoo_auth::UserId;

use super::client::Client;
use super::pool::ClientPool;
use super::registry::ConnectionRegistry;
use super::transport::{OutboundFrame, Transport};
use crate::error::TransportError;

/// Records frames and closes; can be told to fail.
#[derive(Default)]
pub(crate) struct MockTransport {
    sent: Mutex<Vec<OutboundFrame>>,
    closes: AtomicUsize,
    fail_sends: AtomicBool,
    fail_close: AtomicBool,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn sent(&self) -> Vec<OutboundFrame> {
        self.sent.lock().clone()
    }

    pub(crate) fn pings(&self) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|f| **f == OutboundFrame::Ping)
            .count()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("broken pipe".into()));
        }
        self.sent.lock().push(frame);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let _ = self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::Close("reset by peer".into()));
        }
        Ok(())
    }
}

/// An activated client over a fresh [`MockTransport`].
pub(crate) async fn connected_client(
    user: &str,
) -> (
    Arc<Client>,
    Arc<ConnectionRegistry>,
    Arc<MockTransport>,
    CancellationToken,
) {
    let registry = Arc::new(ConnectionRegistry::new());
    let pool = ClientPool::new(registry.clone(), Duration::from_secs(1));
    let client = pool.acquire();
    let transport = MockTransport::new();
    let cancel = CancellationToken::new();
    let _ = client
        .activate(UserId::new(user).unwrap(), transport.clone(), cancel.clone())
        .await
        .unwrap();
    (client, registry, transport, cancel)
}
