//! Arena of reusable clients with an explicit free-list.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use tracing::debug;

use super::client::Client;
use super::registry::ConnectionRegistry;
use crate::error::PoolError;
use crate::metrics::CLIENT_POOL_ALLOCATIONS_TOTAL;

struct PoolInner {
    slots: Vec<Arc<Client>>,
    free: Vec<usize>,
    in_free: Vec<bool>,
}

/// Hands out idle clients and takes them back after reset.
///
/// Slots are never deallocated; [`allocated`](Self::allocated) only grows
/// when the free-list is empty.
pub struct ClientPool {
    registry: Arc<ConnectionRegistry>,
    close_timeout: Duration,
    inner: Mutex<PoolInner>,
}

impl ClientPool {
    /// Create an empty pool whose clients register in `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>, close_timeout: Duration) -> Self {
        Self {
            registry,
            close_timeout,
            inner: Mutex::new(PoolInner {
                slots: Vec::new(),
                free: Vec::new(),
                in_free: Vec::new(),
            }),
        }
    }

    /// Take an idle client, allocating a new slot if none is free.
    pub fn acquire(&self) -> Arc<Client> {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.free.pop() {
            inner.in_free[slot] = false;
            return Arc::clone(&inner.slots[slot]);
        }

        let slot = inner.slots.len();
        let client = Arc::new(Client::new(
            slot,
            Arc::clone(&self.registry),
            self.close_timeout,
        ));
        inner.slots.push(Arc::clone(&client));
        inner.in_free.push(false);
        drop(inner);

        counter!(CLIENT_POOL_ALLOCATIONS_TOTAL).increment(1);
        debug!(slot, "allocated pooled client");
        client
    }

    /// Reset `client` and put its slot back on the free-list.
    ///
    /// Rejected while the client is connected or registered, when the slot
    /// is already free, or when the client came from another pool.
    pub async fn release(&self, client: &Arc<Client>) -> Result<(), PoolError> {
        let slot = client.slot();
        {
            let mut inner = self.inner.lock();
            match inner.slots.get(slot) {
                Some(owned) if Arc::ptr_eq(owned, client) => {}
                _ => return Err(PoolError::ForeignSlot { slot }),
            }
            if inner.in_free[slot] {
                return Err(PoolError::AlreadyFree { slot });
            }
            // Reserve the slot so a concurrent release fails fast.
            inner.in_free[slot] = true;
        }

        if let Err(err) = client.reset().await {
            self.inner.lock().in_free[slot] = false;
            return Err(err);
        }

        self.inner.lock().free.push(slot);
        Ok(())
    }

    /// Client objects ever allocated.
    pub fn allocated(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Slots currently on the free-list.
    pub fn available(&self) -> usize {
        self.inner.lock().free.len()
    }

    /// Every pooled client, free or in use.
    pub fn clients(&self) -> Vec<Arc<Client>> {
        self.inner.lock().slots.clone()
    }
}
