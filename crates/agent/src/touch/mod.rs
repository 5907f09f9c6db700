// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Touch-command drainer: bridges JSON touch requests onto the text
//! protocol of the on-device touch service.
//!
//! The peer greets with a three-line handshake:
//!
//! ```text
//! v <version>
//! ^ <maxContacts> <maxX> <maxY> <maxPressure>
//! $ <pid>
//! ```
//!
//! after which the drainer writes one protocol line per request and
//! discards anything else the peer says.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TouchError;

/// Touch operations. Coordinates are fractions of the advertised axis
/// maxima, so callers stay independent of the panel geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TouchOp {
    /// Finger down.
    #[serde(rename = "d")]
    Down,
    /// Finger move.
    #[serde(rename = "m")]
    Move,
    /// Finger up.
    #[serde(rename = "u")]
    Up,
    /// Commit the queued events.
    #[serde(rename = "c")]
    Commit,
    /// Reset all contacts.
    #[serde(rename = "r")]
    Reset,
    /// Wait the given milliseconds.
    #[serde(rename = "w")]
    Wait,
}

/// One touch request, as received over the WebSocket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TouchRequest {
    pub operation: TouchOp,
    #[serde(default)]
    pub index: u32,
    #[serde(default, rename = "xP")]
    pub x_percent: f64,
    #[serde(default, rename = "yP")]
    pub y_percent: f64,
    #[serde(default)]
    pub pressure: f64,
    #[serde(default)]
    pub milliseconds: u32,
}

/// Axis maxima advertised by the touch service handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchLimits {
    pub max_contacts: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub max_pressure: u32,
}

/// Parse the handshake, then serialize requests from `req_rx` onto the
/// peer until the channel closes. Any write error terminates the drainer
/// with that error.
pub async fn drain_touch_requests<S>(
    stream: S,
    req_rx: &mut mpsc::Receiver<TouchRequest>,
) -> Result<(), TouchError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let mut line = String::new();
    let version = parse_handshake_line(&mut reader, &mut line, 'v', 1).await?;
    let fields = parse_handshake_line(&mut reader, &mut line, '^', 4).await?;
    let limits = TouchLimits {
        max_contacts: fields[0],
        max_x: fields[1],
        max_y: fields[2],
        max_pressure: fields[3],
    };
    let pid = parse_handshake_line(&mut reader, &mut line, '$', 1).await?;
    debug!(version = version[0], pid = pid[0], ?limits, "touch service handshake complete");

    let mut discard = [0u8; 512];
    let mut peer_open = true;
    loop {
        tokio::select! {
            req = req_rx.recv() => match req {
                Some(req) => {
                    let line = format_request(&req, &limits);
                    write_half.write_all(line.as_bytes()).await?;
                }
                None => return Ok(()),
            },
            // The peer's further output is noise; keep the read side
            // drained so the socket buffer cannot fill.
            n = reader.read(&mut discard), if peer_open => {
                if matches!(n, Ok(0)) {
                    peer_open = false;
                }
            }
        }
    }
}

async fn parse_handshake_line<R>(
    reader: &mut BufReader<R>,
    line: &mut String,
    expect_flag: char,
    count: usize,
) -> Result<Vec<u32>, TouchError>
where
    R: AsyncRead + Unpin,
{
    line.clear();
    let n = reader.read_line(line).await?;
    if n == 0 {
        return Err(TouchError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "touch service closed during handshake",
        )));
    }
    let mut fields = line.split_whitespace();
    if fields.next() != Some(expect_flag.to_string().as_str()) {
        return Err(TouchError::Handshake(line.trim_end().to_owned()));
    }
    let values: Vec<u32> = fields.map_while(|f| f.parse().ok()).collect();
    if values.len() != count {
        return Err(TouchError::Handshake(line.trim_end().to_owned()));
    }
    Ok(values)
}

/// Render one request as a protocol line, scaling fractional coordinates
/// by the advertised maxima.
fn format_request(req: &TouchRequest, limits: &TouchLimits) -> String {
    match req.operation {
        TouchOp::Down | TouchOp::Move => {
            let op = if req.operation == TouchOp::Down { 'd' } else { 'm' };
            let x = (req.x_percent * f64::from(limits.max_x)).round() as i64;
            let y = (req.y_percent * f64::from(limits.max_y)).round() as i64;
            let pressure = scale_pressure(req.pressure, limits.max_pressure);
            format!("{op} {} {x} {y} {pressure}\n", req.index)
        }
        TouchOp::Up => format!("u {}\n", req.index),
        TouchOp::Commit => "c\n".to_owned(),
        TouchOp::Reset => "r\n".to_owned(),
        TouchOp::Wait => format!("w {}\n", req.milliseconds),
    }
}

/// Zero means "unspecified" and maps to `max - 1`; anything else is
/// scaled and clamped into `[1, max]`.
fn scale_pressure(fraction: f64, max_pressure: u32) -> u32 {
    let scaled = (fraction * f64::from(max_pressure)).round() as i64;
    if scaled == 0 {
        return max_pressure.saturating_sub(1);
    }
    scaled.clamp(1, i64::from(max_pressure)) as u32
}

#[cfg(test)]
#[path = "touch_tests.rs"]
mod tests;
