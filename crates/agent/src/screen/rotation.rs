// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rotation watcher: consumes orientation digits from a local socket and
//! broadcasts the device rotation to hub subscribers and other listeners.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::backend::{ScreenBackend, ScreenSettings};
use crate::net;
use crate::service::ServiceRegistry;
use crate::state::SCREEN_SERVICE;

/// Process-wide rotation value (degrees) with change broadcasts.
pub struct RotationCell {
    degrees: AtomicU32,
    tx: broadcast::Sender<u32>,
}

impl Default for RotationCell {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { degrees: AtomicU32::new(0), tx }
    }
}

impl RotationCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u32 {
        self.degrees.load(Ordering::Relaxed)
    }

    pub fn publish(&self, degrees: u32) {
        self.degrees.store(degrees, Ordering::Relaxed);
        let _ = self.tx.send(degrees);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<u32> {
        self.tx.subscribe()
    }
}

/// Apply a rotation change: update the shared value, broadcast it, and on
/// the hardware backend refresh the capture helper's arguments (which
/// restarts it when it is keeping).
pub async fn apply_rotation(
    services: &ServiceRegistry,
    settings: &ScreenSettings,
    cell: &RotationCell,
    degrees: u32,
) {
    info!(degrees, "rotation changed");
    cell.publish(degrees);
    if settings.backend().await == ScreenBackend::Hardware {
        let _ = services.update_args(SCREEN_SERVICE, settings.capture_args(degrees)).await;
    }
}

/// Spawn the watcher that follows the rotation socket.
///
/// On disconnect it redials after 1 s; a failed dial backs off 2 s.
pub fn spawn_rotation_watcher(
    services: Arc<ServiceRegistry>,
    settings: Arc<ScreenSettings>,
    cell: Arc<RotationCell>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let wait = match net::connect(&settings.rotation_socket).await {
                Ok(stream) => {
                    debug!(socket = %settings.rotation_socket, "rotation socket connected");
                    let mut lines = BufReader::new(stream).lines();
                    loop {
                        let line = tokio::select! {
                            _ = cancel.cancelled() => return,
                            line = lines.next_line() => line,
                        };
                        match line {
                            Ok(Some(line)) => {
                                if let Ok(direction @ 0..=3) = line.trim().parse::<u32>() {
                                    apply_rotation(&services, &settings, &cell, direction * 90)
                                        .await;
                                }
                            }
                            Ok(None) | Err(_) => break,
                        }
                    }
                    debug!(socket = %settings.rotation_socket, "rotation socket disconnected");
                    Duration::from_secs(1)
                }
                Err(e) => {
                    debug!(socket = %settings.rotation_socket, err = %e, "rotation dial failed");
                    Duration::from_secs(2)
                }
            };
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
        }
    })
}

#[cfg(test)]
#[path = "rotation_tests.rs"]
mod tests;
