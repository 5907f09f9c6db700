// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Devagent: on-device HTTP/WebSocket control agent.
//!
//! A long-lived daemon exposing a REST+WebSocket API that remote
//! controllers use to drive the device: supervised helper processes,
//! framebuffer streaming, touch injection, package installs, and
//! process-table inspection.

pub mod config;
pub mod error;
pub mod idle;
pub mod install;
pub mod jobs;
pub mod net;
pub mod procs;
pub mod screen;
pub mod service;
pub mod shell;
pub mod state;
pub mod timer;
pub mod touch;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AgentConfig;
use crate::state::AgentState;
use crate::transport::build_router;

/// Run the agent until shutdown (SIGTERM/SIGINT or `POST /stop`).
pub async fn run(config: AgentConfig) -> anyhow::Result<()> {
    let addr = config.bind_addr();
    let shutdown = CancellationToken::new();
    let state = AgentState::new(config, shutdown.clone()).await;

    {
        let shutdown = shutdown.clone();
        let services = Arc::clone(&state.services);
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("shutdown signal received, stopping services");
            services.stop_all().await;
            shutdown.cancel();
        });
    }

    let listener = TcpListener::bind(&addr).await?;
    info!("devagent listening on {addr}");
    let router = build_router(state);
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;
    info!("devagent stopped");
    Ok(())
}

async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = term.recv() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}
