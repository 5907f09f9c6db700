// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame hub: fans out capture frames and control text to N subscribers.
//!
//! The hub owns the upstream pipeline (retry-dial + frame reader): the
//! first subscriber spawns it, the last one cancels it. Broadcasts never
//! block on a single subscriber; a subscriber whose channel is full is
//! evicted and its channel closed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::backend::{ScreenBackend, ScreenSettings};
use super::dial::{dial_retry, DialError, DialOptions};
use super::frame;
use super::rotation::RotationCell;
use crate::service::ServiceRegistry;
use crate::state::SCREEN_SERVICE;

/// Identifies one hub subscriber.
pub type SubId = u64;

enum HubCmd {
    Register { id: SubId, tx: mpsc::Sender<Bytes> },
    Unregister { id: SubId },
}

/// Handle to the hub task.
pub struct FrameHub {
    cmd_tx: mpsc::Sender<HubCmd>,
    #[cfg(test)]
    data_tx: mpsc::Sender<Bytes>,
    next_id: AtomicU64,
}

impl FrameHub {
    /// Spawn the hub loop.
    pub fn spawn(
        services: Arc<ServiceRegistry>,
        settings: Arc<ScreenSettings>,
        rotation: Arc<RotationCell>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (data_tx, data_rx) = mpsc::channel::<Bytes>(10);

        let hub = Arc::new(Self {
            cmd_tx,
            #[cfg(test)]
            data_tx: data_tx.clone(),
            next_id: AtomicU64::new(1),
        });

        tokio::spawn(run_loop(services, settings, rotation, shutdown, cmd_rx, data_tx, data_rx));
        hub
    }

    /// Add a subscriber. The caller owns the receiving side; the channel
    /// capacity is the subscriber's slack before eviction.
    pub async fn register(&self, tx: mpsc::Sender<Bytes>) -> SubId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let _ = self.cmd_tx.send(HubCmd::Register { id, tx }).await;
        id
    }

    /// Remove a subscriber; its channel is closed.
    pub async fn unregister(&self, id: SubId) {
        let _ = self.cmd_tx.send(HubCmd::Unregister { id }).await;
    }

    /// Push a payload through the broadcast path, bypassing the upstream
    /// pipeline.
    #[cfg(test)]
    pub(crate) async fn inject(&self, data: Bytes) {
        let _ = self.data_tx.send(data).await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    services: Arc<ServiceRegistry>,
    settings: Arc<ScreenSettings>,
    rotation: Arc<RotationCell>,
    shutdown: CancellationToken,
    mut cmd_rx: mpsc::Receiver<HubCmd>,
    data_tx: mpsc::Sender<Bytes>,
    mut data_rx: mpsc::Receiver<Bytes>,
) {
    let mut clients: HashMap<SubId, mpsc::Sender<Bytes>> = HashMap::new();
    let mut rotation_rx = rotation.subscribe();
    let mut pipeline: Option<CancellationToken> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some(cancel) = pipeline.take() {
                    cancel.cancel();
                }
                return;
            }

            cmd = cmd_rx.recv() => match cmd {
                Some(HubCmd::Register { id, tx }) => {
                    debug!(subscriber = id, "hub subscriber registered");
                    clients.insert(id, tx);
                    let note = format!("rotation {}", rotation.current());
                    let _ = data_tx.try_send(Bytes::from(note));
                    if clients.len() == 1 {
                        let cancel = shutdown.child_token();
                        tokio::spawn(pipeline_loop(
                            Arc::clone(&services),
                            Arc::clone(&settings),
                            data_tx.clone(),
                            cancel.clone(),
                        ));
                        pipeline = Some(cancel);
                    }
                }
                Some(HubCmd::Unregister { id }) => {
                    if clients.remove(&id).is_some() {
                        debug!(subscriber = id, "hub subscriber unregistered");
                    }
                    if clients.is_empty() {
                        if let Some(cancel) = pipeline.take() {
                            debug!("last subscriber left, stopping capture pipeline");
                            cancel.cancel();
                        }
                    }
                }
                None => return,
            },

            Some(data) = data_rx.recv() => {
                broadcast(&mut clients, &data);
            }

            changed = rotation_rx.recv() => match changed {
                Ok(degrees) => {
                    let note = Bytes::from(format!("rotation {degrees}"));
                    broadcast(&mut clients, &note);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}

/// Non-blocking fan-out; slow consumers are evicted and their channels
/// closed by dropping the sender.
fn broadcast(clients: &mut HashMap<SubId, mpsc::Sender<Bytes>>, data: &Bytes) {
    let mut evicted = Vec::new();
    for (id, tx) in clients.iter() {
        if tx.try_send(data.clone()).is_err() {
            evicted.push(*id);
        }
    }
    for id in evicted {
        warn!(subscriber = id, "evicting slow hub subscriber");
        clients.remove(&id);
    }
}

/// Upstream pipeline: dial the capture socket with retries and push
/// frames into the hub until canceled.
async fn pipeline_loop(
    services: Arc<ServiceRegistry>,
    settings: Arc<ScreenSettings>,
    data_tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
) {
    if settings.backend().await == ScreenBackend::Hardware {
        // The hardware helper is supervised by this agent; make sure it runs.
        if let Err(e) = services.start(SCREEN_SERVICE).await {
            debug!(err = %e, "capture service start skipped");
        }
    }
    let socket = settings.screen_socket_name().await;
    debug!(socket, "capture pipeline starting");

    loop {
        if cancel.is_cancelled() {
            return;
        }
        let mut stream = match dial_retry(socket, DialOptions::default(), &cancel).await {
            Ok(stream) => stream,
            Err(DialError::ListenTimeout(addr)) => {
                warn!(socket = %addr, "capture socket never came up");
                let note = format!("{addr} listen timeout, capture service unavailable");
                let _ = data_tx.send(Bytes::from(note)).await;
                return;
            }
            Err(DialError::Canceled) => return,
        };

        let header = tokio::select! {
            _ = cancel.cancelled() => return,
            header = frame::read_header(&mut stream) => header,
        };
        match header {
            Ok(header) => {
                debug!(?header, "capture stream connected");
            }
            Err(e) => {
                warn!(err = %e, "capture header read failed, redialing");
                continue;
            }
        }

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return,
                next = frame::next_frame(&mut stream) => next,
            };
            match next {
                Ok(data) => {
                    if data_tx.send(data).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(err = %e, "capture stream error, redialing");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
