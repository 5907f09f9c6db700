// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST handlers over the core registries.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ErrorCode, ServiceError};
use crate::install::qualify_activity;
use crate::procs;
use crate::screen::rotation::apply_rotation;
use crate::shell;
use crate::state::{AgentState, SCREEN_SERVICE, UITEST_SERVICE};

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub services: Vec<String>,
    pub rotation: u32,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct ServiceStateResponse {
    pub success: bool,
    pub running: bool,
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub filepath: String,
    /// Octal file mode string, e.g. `"0644"`.
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct KeyResponse {
    pub success: bool,
    pub data: KeyData,
}

#[derive(Debug, Serialize)]
pub struct KeyData {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct InstallRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct RotationResponse {
    pub rotation: u32,
}

#[derive(Debug, Serialize)]
pub struct LaunchResponse {
    pub success: bool,
    #[serde(rename = "mainActivity")]
    pub main_activity: String,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IdleTimeoutRequest {
    pub seconds: u64,
}

fn action_ok(description: impl Into<String>) -> (StatusCode, Json<ActionResponse>) {
    (StatusCode::OK, Json(ActionResponse { success: true, description: description.into() }))
}

fn service_error_response(err: &ServiceError) -> (StatusCode, Json<ActionResponse>) {
    match err.code() {
        // Idempotent duplicates: informational 200.
        ErrorCode::AlreadyRunning => action_ok("already started"),
        ErrorCode::AlreadyStopped => action_ok("already stopped"),
        code => (
            code.http_status(),
            Json(ActionResponse { success: false, description: err.to_string() }),
        ),
    }
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<AgentState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        services: s.services.names().await,
        rotation: s.rotation.current(),
    })
}

/// `GET /api/v1/services/{name}`
pub async fn service_state(
    State(s): State<Arc<AgentState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    if !s.services.exists(&name).await {
        return ApiError::new(ErrorCode::NotFound, format!("service {name:?} does not exist"))
            .into_response();
    }
    Json(ServiceStateResponse { success: true, running: s.services.running(&name).await })
        .into_response()
}

/// `POST /api/v1/services/{name}` — start keeping the service.
pub async fn service_start(
    State(s): State<Arc<AgentState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match s.services.start(&name).await {
        Ok(()) => action_ok("successfully started"),
        Err(err) => service_error_response(&err),
    }
}

/// `DELETE /api/v1/services/{name}` — stop the service, waiting for
/// teardown.
pub async fn service_stop(
    State(s): State<Arc<AgentState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match s.services.stop(&name, true).await {
        Ok(()) => action_ok("successfully stopped"),
        Err(err) => service_error_response(&err),
    }
}

/// `POST /stop` — stop every supervised service, then shut the daemon
/// down.
pub async fn stop_daemon(State(s): State<Arc<AgentState>>) -> impl IntoResponse {
    info!("stop requested, stopping all services");
    s.services.stop_all().await;
    let shutdown = s.shutdown.clone();
    tokio::spawn(async move {
        // Give the response a moment to flush before the listener dies.
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
    });
    action_ok("stopping")
}

/// `POST /api/v1/download` — start a background download, returning its
/// key.
pub async fn download_start(
    State(s): State<Arc<AgentState>>,
    Json(req): Json<DownloadRequest>,
) -> impl IntoResponse {
    let mode = match parse_mode(req.mode.as_deref()) {
        Ok(mode) => mode,
        Err(msg) => return ApiError::new(ErrorCode::BadRequest, msg).into_response(),
    };
    match s.jobs.http_download(&req.url, req.filepath.into(), mode) {
        Ok(id) => Json(KeyResponse { success: true, data: KeyData { id } }).into_response(),
        Err(err) => ApiError::new(err.code(), err.to_string()).into_response(),
    }
}

/// `GET /api/v1/download/{key}`
pub async fn download_status(
    State(s): State<Arc<AgentState>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match s.jobs.get(&key) {
        Some(job) => Json(job.snapshot()).into_response(),
        None => ApiError::new(ErrorCode::NotFound, format!("no job {key}")).into_response(),
    }
}

/// `DELETE /api/v1/download/{key}` — cooperative cancel.
pub async fn download_cancel(
    State(s): State<Arc<AgentState>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match s.jobs.cancel(&key) {
        Ok(()) => action_ok("canceled").into_response(),
        Err(err) => ApiError::new(err.code(), err.to_string()).into_response(),
    }
}

/// `POST /api/v1/packages` — download an APK and install it under the
/// install policy.
pub async fn package_install(
    State(s): State<Arc<AgentState>>,
    Json(req): Json<InstallRequest>,
) -> impl IntoResponse {
    let installer = Arc::clone(&s.installer);
    match s.jobs.install_package(&req.url, installer, &s.config.download_dir) {
        Ok(id) => Json(KeyResponse { success: true, data: KeyData { id } }).into_response(),
        Err(err) => ApiError::new(err.code(), err.to_string()).into_response(),
    }
}

/// `GET /api/v1/packages/{key}`
pub async fn package_status(
    State(s): State<Arc<AgentState>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match s.jobs.get(&key) {
        Some(job) => Json(job.snapshot()).into_response(),
        None => ApiError::new(ErrorCode::NotFound, format!("no job {key}")).into_response(),
    }
}

/// `GET /api/v1/rotation`
pub async fn rotation_get(State(s): State<Arc<AgentState>>) -> impl IntoResponse {
    Json(RotationResponse { rotation: s.rotation.current() })
}

/// `POST /api/v1/rotation` — body is the direction (`0..=3`).
pub async fn rotation_set(
    State(s): State<Arc<AgentState>>,
    Json(direction): Json<u32>,
) -> impl IntoResponse {
    if direction > 3 {
        return ApiError::new(ErrorCode::BadRequest, format!("direction {direction} out of range"))
            .into_response();
    }
    let degrees = direction * 90;

    // Capture helpers orphaned to init are outside our supervision and
    // would hold the socket with stale geometry.
    let helper = basename(&s.settings.screen_bin);
    let killed = procs::kill_orphaned_by_name(helper, nix::sys::signal::Signal::SIGKILL);
    if !killed.is_empty() {
        let _ = s.services.start(SCREEN_SERVICE).await;
    }

    apply_rotation(&s.services, &s.settings, &s.rotation, degrees).await;
    Json(RotationResponse { rotation: degrees }).into_response()
}

/// `GET /api/v1/procs`
pub async fn procs_list() -> impl IntoResponse {
    match procs::list_processes() {
        Ok(list) => Json(list).into_response(),
        Err(e) => ApiError::new(ErrorCode::Internal, e.to_string()).into_response(),
    }
}

/// `GET /api/v1/pidof/{package}`
pub async fn pidof(Path(package): Path<String>) -> impl IntoResponse {
    match procs::pid_of(&package) {
        Some(pid) => pid.to_string().into_response(),
        None => ApiError::new(ErrorCode::Gone, format!("no process with cmdline {package}"))
            .into_response(),
    }
}

/// `POST /api/v1/launch/{package}` — resolve the package's main
/// activity and launch it.
pub async fn launch_package(
    State(s): State<Arc<AgentState>>,
    Path(package): Path<String>,
) -> impl IntoResponse {
    let activity = match s.installer.main_activity_of(&package).await {
        Ok(activity) => qualify_activity(&activity),
        Err(e) => {
            return ApiError::new(ErrorCode::Gone, e.to_string()).into_response();
        }
    };

    let component = format!("{package}/{activity}");
    let result = shell::run_shell_timeout(Duration::from_secs(60), &[
        &s.config.am_bin,
        "start",
        "-W",
        "-S",
        "-n",
        &component,
    ])
    .await;

    let response = match result {
        Ok(out) if out.success() => LaunchResponse {
            success: true,
            main_activity: activity,
            output: out.output,
            error: None,
        },
        Ok(out) => LaunchResponse {
            success: false,
            main_activity: activity,
            output: out.output,
            error: Some(format!("activity manager exited with {}", out.status)),
        },
        Err(e) => LaunchResponse {
            success: false,
            main_activity: activity,
            output: String::new(),
            error: Some(e.to_string()),
        },
    };
    Json(response).into_response()
}

/// `GET /api/v1/uitest`
pub async fn uitest_state(State(s): State<Arc<AgentState>>) -> impl IntoResponse {
    s.idle.reset();
    Json(ServiceStateResponse {
        success: true,
        running: s.services.running(UITEST_SERVICE).await,
    })
}

/// `POST /api/v1/uitest`
pub async fn uitest_start(State(s): State<Arc<AgentState>>) -> impl IntoResponse {
    match s.services.start(UITEST_SERVICE).await {
        Ok(()) => action_ok("successfully started"),
        Err(err) => service_error_response(&err),
    }
}

/// `DELETE /api/v1/uitest`
pub async fn uitest_stop(State(s): State<Arc<AgentState>>) -> impl IntoResponse {
    match s.services.stop(UITEST_SERVICE, true).await {
        Ok(()) => action_ok("successfully stopped"),
        Err(err) => service_error_response(&err),
    }
}

/// `POST /api/v1/uitest/timeout` — widen the idle window for a long
/// operation.
pub async fn uitest_timeout(
    State(s): State<Arc<AgentState>>,
    Json(req): Json<IdleTimeoutRequest>,
) -> impl IntoResponse {
    let window = Duration::from_secs(req.seconds);
    s.idle.reset_to(window);
    action_ok(format!("idle window reset to {window:?}"))
}

fn parse_mode(mode: Option<&str>) -> Result<u32, String> {
    match mode {
        None => Ok(0o644),
        Some(raw) => {
            let trimmed = raw.trim_start_matches("0o");
            u32::from_str_radix(trimmed, 8).map_err(|_| format!("invalid file mode: {raw}"))
        }
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
#[path = "http_unit_tests.rs"]
mod tests;
