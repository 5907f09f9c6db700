// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local stream-socket helpers.
//!
//! Socket names starting with `@` are abstract Unix addresses (in-kernel
//! names with no filesystem entry); anything else is a filesystem path.

use std::io;

use tokio::net::{UnixListener, UnixStream};

/// Connect to a local stream socket by name.
pub async fn connect(addr: &str) -> io::Result<UnixStream> {
    match addr.strip_prefix('@') {
        Some(name) => connect_abstract(name),
        None => UnixStream::connect(addr).await,
    }
}

/// Bind a local stream listener by name.
pub fn listen(addr: &str) -> io::Result<UnixListener> {
    match addr.strip_prefix('@') {
        Some(name) => listen_abstract(name),
        None => UnixListener::bind(addr),
    }
}

#[cfg(target_os = "linux")]
fn connect_abstract(name: &str) -> io::Result<UnixStream> {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::net::{SocketAddr, UnixStream as StdUnixStream};

    let sockaddr = SocketAddr::from_abstract_name(name.as_bytes())?;
    let stream = StdUnixStream::connect_addr(&sockaddr)?;
    stream.set_nonblocking(true)?;
    UnixStream::from_std(stream)
}

#[cfg(target_os = "linux")]
fn listen_abstract(name: &str) -> io::Result<UnixListener> {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::net::{SocketAddr, UnixListener as StdUnixListener};

    let sockaddr = SocketAddr::from_abstract_name(name.as_bytes())?;
    let listener = StdUnixListener::bind_addr(&sockaddr)?;
    listener.set_nonblocking(true)?;
    UnixListener::from_std(listener)
}

#[cfg(not(target_os = "linux"))]
fn connect_abstract(_name: &str) -> io::Result<UnixStream> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "abstract sockets require linux"))
}

#[cfg(not(target_os = "linux"))]
fn listen_abstract(_name: &str) -> io::Result<UnixListener> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "abstract sockets require linux"))
}

#[cfg(test)]
#[path = "net_tests.rs"]
mod tests;
