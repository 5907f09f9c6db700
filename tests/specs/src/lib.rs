// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end agent scenarios.
//!
//! Boots the full agent (state, router, listener) in-process and fakes
//! the on-device collaborators: the capture socket, the touch socket,
//! and the platform tools.

use std::io::Write;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use devagent::config::AgentConfig;
use devagent::state::AgentState;
use devagent::transport::build_router;

#[derive(Debug, Parser)]
struct ConfigWrapper {
    #[command(flatten)]
    config: AgentConfig,
}

/// Parse a config exactly the way the binary does.
pub fn agent_config(extra: &[&str]) -> AgentConfig {
    let mut argv = vec![
        "devagent",
        "--backend",
        "agent",
        "--uitest-cmd",
        "sleep 30",
        "--sdk-level",
        "23",
        "--idle-timeout-secs",
        "600",
    ];
    argv.extend_from_slice(extra);
    ConfigWrapper::parse_from(argv).config
}

/// A running agent bound to an ephemeral port.
pub struct TestAgent {
    pub addr: SocketAddr,
    pub state: Arc<AgentState>,
    pub serve_handle: tokio::task::JoinHandle<()>,
}

impl TestAgent {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn ws(&self, path: &str) -> String {
        format!("ws://{}{path}", self.addr)
    }
}

/// Boot the agent on 127.0.0.1:0 and serve until the state's shutdown
/// token fires (or the test ends).
pub async fn boot(config: AgentConfig) -> anyhow::Result<TestAgent> {
    let shutdown = CancellationToken::new();
    let state = AgentState::new(config, shutdown.clone()).await;
    let router = build_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let serve_handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await;
    });

    Ok(TestAgent { addr, state, serve_handle })
}

/// Write an executable shell script and return its path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).expect("create script");
    f.write_all(body.as_bytes()).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod script");
    path.to_string_lossy().into_owned()
}

/// Encode the capture stream header.
pub fn capture_header() -> Vec<u8> {
    let mut wire = Vec::new();
    wire.push(1u8);
    wire.push(0u8);
    wire.extend_from_slice(&4242u32.to_le_bytes());
    for dim in [1080u32, 1920, 1080, 1920] {
        wire.extend_from_slice(&dim.to_le_bytes());
    }
    wire.push(0u8);
    wire.push(0u8);
    wire
}

/// Encode one length-prefixed frame.
pub fn capture_frame(payload: &[u8]) -> Vec<u8> {
    let mut wire = Vec::new();
    wire.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    wire.extend_from_slice(payload);
    wire
}

/// Spawn a fake capture service behind a local socket: every connection
/// gets the header followed by an endless slow stream of distinct
/// JPEG-marked frames.
pub fn spawn_fake_capture(socket_path: &str) -> anyhow::Result<()> {
    let listener = devagent::net::listen(socket_path)?;
    tokio::spawn(async move {
        loop {
            let Ok((mut conn, _)) = listener.accept().await else { return };
            tokio::spawn(async move {
                use tokio::io::AsyncWriteExt;
                if conn.write_all(&capture_header()).await.is_err() {
                    return;
                }
                let mut seq = 0u8;
                loop {
                    let frame = capture_frame(&[0xff, 0xd8, seq]);
                    if conn.write_all(&frame).await.is_err() {
                        return;
                    }
                    seq = seq.wrapping_add(1);
                    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
                }
            });
        }
    });
    Ok(())
}
