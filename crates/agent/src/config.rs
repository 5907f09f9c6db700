// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::Serialize;

/// Which screen/touch backend to bridge to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// Probe the capture helper at first use and pick automatically.
    Auto,
    /// Always use the hardware helpers and their sockets.
    Hardware,
    /// Always use the on-device agent app sockets.
    Agent,
}

/// Configuration for the device agent daemon.
#[derive(Debug, Clone, clap::Args, Serialize)]
pub struct AgentConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "DEVAGENT_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 7912, env = "DEVAGENT_PORT")]
    pub port: u16,

    /// Abstract socket of the hardware screen-capture helper.
    #[arg(long, default_value = "@scrcapd", env = "DEVAGENT_SCREEN_SOCKET")]
    pub screen_socket: String,

    /// Abstract socket of the agent-app screen stream (fallback backend).
    #[arg(long, default_value = "@scrcapd.agent", env = "DEVAGENT_SCREEN_AGENT_SOCKET")]
    pub screen_agent_socket: String,

    /// Abstract socket of the hardware touch helper.
    #[arg(long, default_value = "@touchd", env = "DEVAGENT_TOUCH_SOCKET")]
    pub touch_socket: String,

    /// Abstract socket of the agent-app touch service (fallback backend).
    #[arg(long, default_value = "@touchd.agent", env = "DEVAGENT_TOUCH_AGENT_SOCKET")]
    pub touch_agent_socket: String,

    /// Abstract socket emitting orientation digits (`0..=3`, newline-delimited).
    #[arg(long, default_value = "@rotationd", env = "DEVAGENT_ROTATION_SOCKET")]
    pub rotation_socket: String,

    /// Path of the screen-capture helper binary.
    #[arg(long, default_value = "/data/local/tmp/scrcapd", env = "DEVAGENT_SCREEN_BIN")]
    pub screen_bin: String,

    /// Path of the touch helper binary.
    #[arg(long, default_value = "/data/local/tmp/touchd", env = "DEVAGENT_TOUCH_BIN")]
    pub touch_bin: String,

    /// Shell command that runs the on-device UI test runner.
    #[arg(
        long,
        default_value = "am instrument -w -r -e debug false com.device.uitest.test/androidx.test.runner.AndroidJUnitRunner",
        env = "DEVAGENT_UITEST_CMD"
    )]
    pub uitest_cmd: String,

    /// Backend selection for the screen/touch bridges.
    #[arg(long, value_enum, default_value = "auto", env = "DEVAGENT_BACKEND")]
    pub backend: BackendChoice,

    /// Display width in pixels, used to build capture-helper arguments.
    #[arg(long, default_value_t = 1080, env = "DEVAGENT_DISPLAY_WIDTH")]
    pub display_width: u32,

    /// Display height in pixels.
    #[arg(long, default_value_t = 1920, env = "DEVAGENT_DISPLAY_HEIGHT")]
    pub display_height: u32,

    /// Stop the UI test runner after this many seconds without serviced RPCs.
    #[arg(long, default_value_t = 180, env = "DEVAGENT_IDLE_TIMEOUT_SECS")]
    pub idle_timeout_secs: u64,

    /// Directory for temporary package downloads.
    #[arg(long, default_value = "/data/local/tmp", env = "DEVAGENT_DOWNLOAD_DIR")]
    pub download_dir: String,

    /// Platform package-manager command.
    #[arg(long, default_value = "pm", env = "DEVAGENT_PM_BIN")]
    pub pm_bin: String,

    /// Platform activity-manager command.
    #[arg(long, default_value = "am", env = "DEVAGENT_AM_BIN")]
    pub am_bin: String,

    /// Tool used to read package names and activities out of an APK.
    #[arg(long, default_value = "aapt", env = "DEVAGENT_AAPT_BIN")]
    pub aapt_bin: String,

    /// Platform SDK level; probed via `getprop` when unset.
    #[arg(long, env = "DEVAGENT_SDK_LEVEL")]
    pub sdk_level: Option<u32>,
}

impl AgentConfig {
    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            screen_socket: "@scrcapd".into(),
            screen_agent_socket: "@scrcapd.agent".into(),
            touch_socket: "@touchd".into(),
            touch_agent_socket: "@touchd.agent".into(),
            rotation_socket: "@rotationd".into(),
            screen_bin: "/data/local/tmp/scrcapd".into(),
            touch_bin: "/data/local/tmp/touchd".into(),
            uitest_cmd: "sleep 60".into(),
            backend: BackendChoice::Agent,
            display_width: 1080,
            display_height: 1920,
            idle_timeout_secs: 180,
            download_dir: std::env::temp_dir().to_string_lossy().into_owned(),
            pm_bin: "pm".into(),
            am_bin: "am".into(),
            aapt_bin: "aapt".into(),
            sdk_level: Some(23),
        }
    }
}
