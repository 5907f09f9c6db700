// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend selection for the screen/touch bridges.
//!
//! Some device classes cannot run the hardware capture helper; there the
//! agent app provides equivalent streams on alternate socket names. The
//! hardware helper is probed once with a `-t` dry run (it prints `OK` as
//! its last line when the capture method works) and the verdict is cached
//! for the process lifetime.

use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::info;

use crate::config::{AgentConfig, BackendChoice};
use crate::shell;

/// Which side provides the screen and touch sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenBackend {
    /// The hardware capture/touch helpers, supervised by this agent.
    Hardware,
    /// The on-device agent app.
    Agent,
}

/// Socket names, helper paths, and display geometry for the bridges.
#[derive(Debug)]
pub struct ScreenSettings {
    pub screen_socket: String,
    pub screen_agent_socket: String,
    pub touch_socket: String,
    pub touch_agent_socket: String,
    pub rotation_socket: String,
    pub screen_bin: String,
    pub touch_bin: String,
    pub display_width: u32,
    pub display_height: u32,
    choice: BackendChoice,
    probed: OnceCell<ScreenBackend>,
}

impl ScreenSettings {
    pub fn from_config(cfg: &AgentConfig) -> Self {
        Self {
            screen_socket: cfg.screen_socket.clone(),
            screen_agent_socket: cfg.screen_agent_socket.clone(),
            touch_socket: cfg.touch_socket.clone(),
            touch_agent_socket: cfg.touch_agent_socket.clone(),
            rotation_socket: cfg.rotation_socket.clone(),
            screen_bin: cfg.screen_bin.clone(),
            touch_bin: cfg.touch_bin.clone(),
            display_width: cfg.display_width,
            display_height: cfg.display_height,
            choice: cfg.backend,
            probed: OnceCell::new(),
        }
    }

    /// Resolve the backend, probing the capture helper on first use.
    pub async fn backend(&self) -> ScreenBackend {
        match self.choice {
            BackendChoice::Hardware => ScreenBackend::Hardware,
            BackendChoice::Agent => ScreenBackend::Agent,
            BackendChoice::Auto => *self
                .probed
                .get_or_init(|| async {
                    let backend = if self.capture_helper_works().await {
                        ScreenBackend::Hardware
                    } else {
                        ScreenBackend::Agent
                    };
                    info!(?backend, "screen backend selected");
                    backend
                })
                .await,
        }
    }

    /// The socket the frame pipeline should dial.
    pub async fn screen_socket_name(&self) -> &str {
        match self.backend().await {
            ScreenBackend::Hardware => &self.screen_socket,
            ScreenBackend::Agent => &self.screen_agent_socket,
        }
    }

    /// The socket the touch drainer should dial.
    pub async fn touch_socket_name(&self) -> &str {
        match self.backend().await {
            ScreenBackend::Hardware => &self.touch_socket,
            ScreenBackend::Agent => &self.touch_agent_socket,
        }
    }

    /// Argument list for the supervised capture helper at `rotation` degrees.
    pub fn capture_args(&self, rotation: u32) -> Vec<String> {
        let (w, h) = (self.display_width, self.display_height);
        vec![
            self.screen_bin.clone(),
            "-S".to_owned(),
            "-P".to_owned(),
            format!("{w}x{h}@{w}x{h}/{rotation}"),
        ]
    }

    /// Library path environment for the capture helper.
    pub fn capture_env(&self) -> Vec<(String, String)> {
        let dir = std::path::Path::new(&self.screen_bin)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/data/local/tmp".to_owned());
        vec![("LD_LIBRARY_PATH".to_owned(), dir)]
    }

    /// Dry-run the capture helper; `-t` attempts the capture method and
    /// prints `OK` as its last line on success.
    async fn capture_helper_works(&self) -> bool {
        let (w, h) = (self.display_width, self.display_height);
        let geometry = format!("{w}x{h}@{w}x{h}/0");
        let env = self.capture_env();
        let envs: Vec<(&str, &str)> =
            env.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let out = shell::run_shell_timeout_env(Duration::from_secs(10), &envs, &[
            &self.screen_bin,
            "-P",
            &geometry,
            "-t",
        ])
        .await;
        match out {
            Ok(out) if out.success() => {
                out.output.lines().rev().find(|l| !l.trim().is_empty()).map(str::trim)
                    == Some("OK")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
