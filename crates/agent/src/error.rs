// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Machine-readable error codes surfaced by the HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    AlreadyRunning,
    AlreadyStopped,
    BadRequest,
    Gone,
    ListenTimeout,
    Canceled,
    Timeout,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            // Idempotent duplicates map to 2xx with an informational description.
            Self::AlreadyRunning | Self::AlreadyStopped => StatusCode::OK,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Gone => StatusCode::GONE,
            Self::ListenTimeout | Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Canceled => StatusCode::CONFLICT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error reply sent by the REST handlers: a flat `{code, message}` body
/// under the code's HTTP status.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.http_status(), Json(self)).into_response()
    }
}

/// Errors from the supervised-service registry.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service not found: {0}")]
    NotFound(String),
    #[error("name conflict: {0}")]
    NameConflict(String),
    #[error("args must not be empty")]
    EmptyArgs,
    #[error("already running")]
    AlreadyRunning,
    #[error("already stopped")]
    AlreadyStopped,
    #[error("start hook rejected launch: {0}")]
    StartHook(String),
}

impl ServiceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::NameConflict(_) | Self::EmptyArgs | Self::StartHook(_) => ErrorCode::BadRequest,
            Self::AlreadyRunning => ErrorCode::AlreadyRunning,
            Self::AlreadyStopped => ErrorCode::AlreadyStopped,
        }
    }
}

/// Terminal errors recorded by background jobs. Cloneable so that
/// `wait()` can hand the exact terminal error to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("invalid url: {0}")]
    BadUrl(String),
    #[error("http download <{url}> status {status}: {body}")]
    HttpStatus { url: String, status: u16, body: String },
    #[error("http error: {0}")]
    Http(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("download canceled")]
    Canceled,
    #[error("download timed out")]
    Timeout,
    #[error("install failed: {0}")]
    Install(String),
}

impl JobError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::BadUrl(_) => ErrorCode::BadRequest,
            Self::Canceled => ErrorCode::Canceled,
            Self::Timeout => ErrorCode::Timeout,
            _ => ErrorCode::Internal,
        }
    }
}

/// Errors from the platform installer.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("install failure [{code}]: {output}")]
    Failure { code: String, output: String },
    #[error("installer exited with {status}: {output}")]
    Exit { status: i32, output: String },
    #[error("apk introspection failed: {0}")]
    Apk(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors terminating a framebuffer stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("wrong image format, expected jpeg payload")]
    WrongFormat,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the touch-command drainer.
#[derive(Debug, thiserror::Error)]
pub enum TouchError {
    #[error("malformed handshake line: {0:?}")]
    Handshake(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
