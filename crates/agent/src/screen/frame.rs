// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary protocol reader for the screen-capture stream.
//!
//! Wire format, little-endian throughout:
//!
//! ```text
//! header (13 bytes, once):
//!   version: u8    unused: u8    pid: u32
//!   real_w: u32    real_h: u32   virt_w: u32   virt_h: u32
//!   orientation: u8    quirk: u8
//! frames (repeating):
//!   size: u32      payload: size bytes, first two bytes 0xFF 0xD8
//! ```

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::FrameError;

/// JPEG start-of-image marker; every frame payload must begin with it.
pub const JPEG_SOI: [u8; 2] = [0xff, 0xd8];

/// One-shot stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub version: u8,
    pub pid: u32,
    pub real_width: u32,
    pub real_height: u32,
    pub virt_width: u32,
    pub virt_height: u32,
    pub orientation: u8,
    pub quirk: u8,
}

/// Read the 13-byte stream header.
pub async fn read_header<R>(r: &mut R) -> Result<StreamHeader, FrameError>
where
    R: AsyncRead + Unpin,
{
    let version = r.read_u8().await?;
    let _unused = r.read_u8().await?;
    let pid = r.read_u32_le().await?;
    let real_width = r.read_u32_le().await?;
    let real_height = r.read_u32_le().await?;
    let virt_width = r.read_u32_le().await?;
    let virt_height = r.read_u32_le().await?;
    let orientation = r.read_u8().await?;
    let quirk = r.read_u8().await?;
    Ok(StreamHeader {
        version,
        pid,
        real_width,
        real_height,
        virt_width,
        virt_height,
        orientation,
        quirk,
    })
}

/// Read the next length-prefixed JPEG frame.
///
/// A payload that does not start with the JPEG marker terminates the
/// stream with [`FrameError::WrongFormat`]; I/O errors pass through.
pub async fn next_frame<R>(r: &mut R) -> Result<Bytes, FrameError>
where
    R: AsyncRead + Unpin,
{
    let size = r.read_u32_le().await? as usize;
    let mut payload = vec![0u8; size];
    r.read_exact(&mut payload).await?;
    if payload.len() < 2 || payload[..2] != JPEG_SOI {
        return Err(FrameError::WrongFormat);
    }
    Ok(Bytes::from(payload))
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
