// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the device agent.

pub mod http;
pub mod single_flight;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AgentState;

/// Build the axum `Router` with all agent routes.
pub fn build_router(state: Arc<AgentState>) -> Router {
    Router::new()
        // Health
        .route("/api/v1/health", get(http::health))
        // Supervised services
        .route(
            "/api/v1/services/{name}",
            get(http::service_state).post(http::service_start).delete(http::service_stop),
        )
        // Background downloads
        .route("/api/v1/download", post(http::download_start))
        .route(
            "/api/v1/download/{key}",
            get(http::download_status).delete(http::download_cancel),
        )
        // Package installs
        .route("/api/v1/packages", post(http::package_install))
        .route("/api/v1/packages/{key}", get(http::package_status))
        // Rotation
        .route("/api/v1/rotation", get(http::rotation_get).post(http::rotation_set))
        // Process table
        .route("/api/v1/procs", get(http::procs_list))
        .route("/api/v1/pidof/{package}", get(http::pidof))
        // App launch
        .route("/api/v1/launch/{package}", post(http::launch_package))
        // UI test runner
        .route(
            "/api/v1/uitest",
            get(http::uitest_state).post(http::uitest_start).delete(http::uitest_stop),
        )
        .route("/api/v1/uitest/timeout", post(http::uitest_timeout))
        // Daemon stop
        .route("/stop", post(http::stop_daemon))
        // Interactive streams
        .route("/ws/screen", get(ws::screen_ws))
        .route("/ws/touch", get(ws::touch_ws))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
