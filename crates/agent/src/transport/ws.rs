// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket endpoints bridging local device sockets to the network:
//! `/ws/screen` (frame fan-out) and `/ws/touch` (touch injection).
//!
//! Both endpoints are single-flight per URL: a new connection pre-empts
//! the previous one instead of queueing behind it.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ServiceError;
use crate::screen::backend::ScreenBackend;
use crate::screen::dial::{dial_retry, DialError, DialOptions};
use crate::screen::frame::JPEG_SOI;
use crate::state::{AgentState, TOUCH_SERVICE};
use crate::touch::{drain_touch_requests, TouchRequest};

const SCREEN_WS_KEY: &str = "/ws/screen";
const TOUCH_WS_KEY: &str = "/ws/touch";

/// `GET /ws/screen` — stream capture frames to this client.
pub async fn screen_ws(
    State(state): State<Arc<AgentState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_screen(state, socket))
}

async fn handle_screen(state: Arc<AgentState>, socket: WebSocket) {
    let flight = state.flights.begin(SCREEN_WS_KEY);
    let (frame_tx, mut frame_rx) = mpsc::channel::<Bytes>(256);
    let sub = state.hub.register(frame_tx).await;
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            _ = flight.preempted().cancelled() => {
                debug!("screen stream pre-empted by a newer connection");
                break;
            }

            frame = frame_rx.recv() => match frame {
                Some(data) => {
                    let msg = if data.starts_with(&JPEG_SOI) {
                        Message::Binary(data)
                    } else {
                        Message::Text(String::from_utf8_lossy(&data).into_owned().into())
                    };
                    if ws_tx.send(msg).await.is_err() {
                        break;
                    }
                }
                // Evicted as a slow consumer, or the hub shut down.
                None => break,
            },

            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Clients have nothing meaningful to say on this socket.
                _ => {}
            },
        }
    }

    state.hub.unregister(sub).await;
    debug!("screen stream finished");
}

/// `GET /ws/touch` — accept JSON touch requests and drive the touch
/// service with them.
pub async fn touch_ws(
    State(state): State<Arc<AgentState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_touch(state, socket))
}

async fn handle_touch(state: Arc<AgentState>, socket: WebSocket) {
    let flight = state.flights.begin(TOUCH_WS_KEY);
    let (mut ws_tx, mut ws_rx) = socket.split();

    if state.settings.backend().await == ScreenBackend::Hardware {
        let _ = ws_tx.send(Message::Text("start touch service".into())).await;
        match state.services.start(TOUCH_SERVICE).await {
            Ok(()) | Err(ServiceError::AlreadyRunning) => {}
            Err(e) => {
                let _ = ws_tx
                    .send(Message::Text(format!("touch service start failed: {e}").into()))
                    .await;
                return;
            }
        }
    }

    let (req_tx, req_rx) = mpsc::channel::<TouchRequest>(10);
    let (note_tx, mut note_rx) = mpsc::channel::<String>(4);
    let cancel = CancellationToken::new();
    let drainer = tokio::spawn(touch_drain_loop(
        Arc::clone(&state),
        req_rx,
        note_tx,
        cancel.clone(),
    ));

    loop {
        tokio::select! {
            _ = flight.preempted().cancelled() => {
                debug!("touch stream pre-empted by a newer connection");
                break;
            }

            note = note_rx.recv() => match note {
                Some(note) => {
                    let closing = note.contains("listen timeout");
                    let _ = ws_tx.send(Message::Text(note.into())).await;
                    if closing {
                        break;
                    }
                }
                None => break,
            },

            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Ok(req) = serde_json::from_str::<TouchRequest>(&text) else {
                        let _ = ws_tx
                            .send(Message::Text("unparseable touch request".into()))
                            .await;
                        continue;
                    };
                    match tokio::time::timeout(Duration::from_secs(2), req_tx.send(req)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(_)) => break,
                        Err(_) => {
                            let _ = ws_tx
                                .send(Message::Text("touch request buffer full".into()))
                                .await;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
        }
    }

    cancel.cancel();
    drop(req_tx);
    let _ = drainer.await;
    debug!("touch stream finished");
}

/// Dial the touch socket and pump requests into it, redialing on drain
/// errors until the request channel closes or the loop is canceled.
async fn touch_drain_loop(
    state: Arc<AgentState>,
    mut req_rx: mpsc::Receiver<TouchRequest>,
    note_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    let socket = state.settings.touch_socket_name().await;
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let conn = match dial_retry(socket, DialOptions::default(), &cancel).await {
            Ok(conn) => conn,
            Err(DialError::ListenTimeout(addr)) => {
                let _ = note_tx
                    .send(format!("{addr} listen timeout, touch service unavailable"))
                    .await;
                return;
            }
            Err(DialError::Canceled) => return,
        };
        debug!(socket, "touch socket connected");
        match drain_touch_requests(conn, &mut req_rx).await {
            Ok(()) => return,
            Err(e) => {
                debug!(err = %e, "touch drain error, redialing");
                let _ = note_tx.send(format!("touch service error: {e}")).await;
            }
        }
    }
}
