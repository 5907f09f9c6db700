// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight policy for interactive WebSocket endpoints.
//!
//! At most one connection is active per URL; a newer upgrade pre-empts
//! the older one rather than queueing behind it. The registry is held
//! only for map updates, never across I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct Flight {
    id: u64,
    cancel: CancellationToken,
}

/// Per-URL registry of in-flight connections.
#[derive(Default)]
pub struct SingleFlight {
    inner: Mutex<HashMap<String, Flight>>,
    next_id: AtomicU64,
}

impl SingleFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the slot for `key`, evicting and closing any prior holder.
    /// The returned guard's token fires if a newer claim arrives.
    pub fn begin(self: &Arc<Self>, key: &str) -> FlightGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let prior = self
            .inner
            .lock()
            .insert(key.to_owned(), Flight { id, cancel: cancel.clone() });
        if let Some(prior) = prior {
            debug!(key, evicted = prior.id, "pre-empting prior connection");
            prior.cancel.cancel();
        }
        FlightGuard { registry: Arc::clone(self), key: key.to_owned(), id, cancel }
    }

    /// Remove the mapping only if it still belongs to `id`, so a later
    /// pre-emptor is not evicted by the earlier handler's teardown.
    fn clear_if_current(&self, key: &str, id: u64) {
        let mut inner = self.inner.lock();
        if inner.get(key).is_some_and(|f| f.id == id) {
            inner.remove(key);
        }
    }

    /// Whether some connection currently holds `key`.
    pub fn holds(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }
}

/// Slot ownership for the lifetime of one connection handler.
pub struct FlightGuard {
    registry: Arc<SingleFlight>,
    key: String,
    id: u64,
    cancel: CancellationToken,
}

impl FlightGuard {
    /// Fires when a newer connection claims the same URL.
    pub fn preempted(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.registry.clear_if_current(&self.key, self.id);
    }
}

#[cfg(test)]
#[path = "single_flight_tests.rs"]
mod tests;
