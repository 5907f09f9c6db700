// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idle guard: stops the UI test services after a quiet window.
//!
//! Every serviced RPC that touches the UI test runner resets the timer;
//! when it fires, the guarded services are stopped. Stopping those
//! services (from any path) disarms the timer via their stop hooks.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::service::ServiceRegistry;
use crate::timer::SafeTimer;

pub struct IdleGuard {
    timer: Arc<SafeTimer>,
    window: Duration,
}

impl IdleGuard {
    /// Arm the guard and spawn its watcher task.
    pub fn spawn(
        timer: Arc<SafeTimer>,
        window: Duration,
        services: Arc<ServiceRegistry>,
        guarded: Vec<String>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let guard = Arc::new(Self { timer: Arc::clone(&timer), window });
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    fired = timer.fired() => match fired {
                        Some(()) => {
                            info!(services = ?guarded, "idle window elapsed, stopping services");
                            for name in &guarded {
                                let _ = services.stop(name, true).await;
                            }
                        }
                        None => return,
                    },
                }
            }
        });
        guard
    }

    /// Push the deadline out by the configured window.
    pub fn reset(&self) {
        self.timer.reset(Some(self.window));
    }

    /// Push the deadline out by a caller-chosen window (also becomes the
    /// window for subsequent plain resets).
    pub fn reset_to(&self, window: Duration) {
        self.timer.reset(Some(window));
    }

    /// Disarm the countdown until the next reset.
    pub fn disarm(&self) {
        self.timer.stop();
    }
}

#[cfg(test)]
#[path = "idle_tests.rs"]
mod tests;
