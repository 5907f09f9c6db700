// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded retry-dial loop for local stream sockets.

use std::time::Duration;

use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::net;

/// Retry policy for dialing a local socket.
#[derive(Debug, Clone, Copy)]
pub struct DialOptions {
    /// Consecutive failures tolerated before giving up.
    pub max_retries: u32,
    /// Sleep between attempts.
    pub backoff: Duration,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self { max_retries: 10, backoff: Duration::from_millis(500) }
    }
}

/// Outcome of a failed dial loop.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DialError {
    #[error("{0} listen timeout")]
    ListenTimeout(String),
    #[error("dial canceled")]
    Canceled,
}

/// Dial `addr`, retrying on failure with a fixed backoff.
///
/// Gives up after `max_retries` consecutive failures. Cancellation is
/// observed between attempts; a cancel during the backoff sleep returns
/// immediately.
pub async fn dial_retry(
    addr: &str,
    opts: DialOptions,
    cancel: &CancellationToken,
) -> Result<UnixStream, DialError> {
    let mut retries = 0u32;
    loop {
        if retries > opts.max_retries {
            return Err(DialError::ListenTimeout(addr.to_owned()));
        }
        match net::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                retries += 1;
                debug!(addr, err = %e, wait = ?opts.backoff, "dial failed, retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(DialError::Canceled),
                    _ = tokio::time::sleep(opts.backoff) => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "dial_tests.rs"]
mod tests;
