// SPDX-FileCopyrightText: 2025-2026 The vperf contributors
// SPDX-License-Identifier: Apache-2.0

//! Host-side stand-in for a hypervisor vsock muxer.
//!
//! Answers the `CONNECT <port>` handshake on a base rendezvous path and
//! forwards the connection to whoever listens on `<base>_<port>`. Good enough
//! to run client and server of the Unix emulation on one machine.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt, copy_bidirectional};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use vperf_common::error::TransportError;

// Longest acceptable request line, "connect 4294967295\n" fits comfortably
const MAX_REQUEST_LEN: usize = 32;

// Muxers hand out host-side local ports from here upwards
const FIRST_LOCAL_PORT: u32 = 1 << 30;

pub struct Relay {
    listener: UnixListener,
    base: PathBuf,
    next_port: AtomicU32,
}

async fn read_request(stream: &mut UnixStream) -> io::Result<u32> {
    let mut line = Vec::with_capacity(MAX_REQUEST_LEN);
    loop {
        let byte = stream.read_u8().await?;
        if byte == b'\n' {
            break;
        }
        line.push(byte);
        if line.len() >= MAX_REQUEST_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "request line too long"));
        }
    }
    parse_request(&line)
}

fn parse_request(line: &[u8]) -> io::Result<u32> {
    let invalid = || io::Error::new(io::ErrorKind::InvalidData, "invalid port request");
    let line = std::str::from_utf8(line).map_err(|_| invalid())?;
    let mut words = line.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some(keyword), Some(port), None) if keyword.eq_ignore_ascii_case("connect") => {
            port.parse().map_err(|_| invalid())
        }
        _ => Err(invalid()),
    }
}

fn upstream_path(base: &Path, port: u32) -> PathBuf {
    let mut path = base.as_os_str().to_owned();
    path.push(format!("_{port}"));
    PathBuf::from(path)
}

async fn forward(mut client: UnixStream, base: PathBuf, local_port: u32) -> io::Result<()> {
    let port = read_request(&mut client).await?;
    let target = upstream_path(&base, port);
    let mut upstream = UnixStream::connect(&target).await?;
    client
        .write_all(format!("OK {local_port}\n").as_bytes())
        .await?;
    debug!("Relaying port {port} to {}", target.display());
    let (up, down) = copy_bidirectional(&mut client, &mut upstream).await?;
    debug!("Relay for port {port} done, {up} bytes up, {down} bytes down");
    Ok(())
}

impl Relay {
    /// Listen on `base`, replacing a stale socket file if any
    ///
    /// # Errors
    /// Return `Err` if the socket can't be bound
    pub fn bind(base: impl Into<PathBuf>) -> Result<Self, TransportError> {
        let base = base.into();
        let bind_err = |source| TransportError::BindOrListen {
            endpoint: format!("unix:{}", base.display()),
            source,
        };
        crate::listener::remove_stale_socket(&base).map_err(bind_err)?;
        let listener = UnixListener::bind(&base).map_err(bind_err)?;
        info!("Relay listening on {}", base.display());
        Ok(Self {
            listener,
            base,
            next_port: AtomicU32::new(FIRST_LOCAL_PORT),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.base
    }

    /// Accept and forward connections until accept fails.
    ///
    /// # Errors
    /// Return `Err` when the listening socket fails
    pub async fn serve(&self) -> Result<(), TransportError> {
        loop {
            let (client, _) = self.listener.accept().await?;
            let local_port = self.next_port.fetch_add(1, Ordering::Relaxed);
            let base = self.base.clone();
            tokio::spawn(async move {
                if let Err(err) = forward(client, base, local_port).await {
                    warn!("Relay connection {local_port} failed: {err}");
                }
            });
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.base);
    }
}
