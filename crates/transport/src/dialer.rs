// SPDX-FileCopyrightText: 2025-2026 The vperf contributors
// SPDX-License-Identifier: Apache-2.0

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixSocket;
#[cfg(any(target_os = "linux", target_os = "android"))]
use tokio_vsock::{VsockAddr, VsockStream};
use tracing::debug;

use vperf_common::address::{Endpoint, Purpose, resolve};
use vperf_common::error::TransportError;

use crate::connection::Connection;

// Upper bound for the "OK <port>\n" acknowledgement
const MAX_REPLY_LEN: usize = 1024;

async fn with_deadline<T>(
    endpoint: &Endpoint,
    deadline: Option<Duration>,
    connect: impl Future<Output = io::Result<T>>,
) -> Result<T, TransportError> {
    let connected = match deadline {
        Some(timeout) => tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                endpoint: endpoint.to_string(),
                timeout,
            })?,
        None => connect.await,
    };
    connected.map_err(|source| TransportError::Connect {
        endpoint: endpoint.to_string(),
        source,
    })
}

/// Perform the host side of the rendezvous handshake: ask the muxer for `port`
/// and swallow its acknowledgement line.
///
/// The reply is not parsed, only the terminating newline is required.
///
/// # Errors
/// Return `Err` if the request can't be written, or the peer closes or fails
/// before the reply line is complete
pub async fn handshake(conn: &mut Connection, port: u32) -> io::Result<Vec<u8>> {
    conn.write_all(format!("CONNECT {port}\n").as_bytes()).await?;

    let mut reply = Vec::new();
    loop {
        let byte = conn.read_u8().await?;
        reply.push(byte);
        if byte == b'\n' {
            break;
        }
        if reply.len() >= MAX_REPLY_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "handshake reply is not newline terminated",
            ));
        }
    }
    Ok(reply)
}

async fn connect(endpoint: &Endpoint, deadline: Option<Duration>) -> Result<Connection, TransportError> {
    match endpoint {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        Endpoint::Vsock { cid, port } => {
            let addr = VsockAddr::new(*cid, *port);
            let stream = with_deadline(endpoint, deadline, VsockStream::connect(addr)).await?;
            Ok(Connection::Vsock(stream))
        }
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        Endpoint::Vsock { .. } => Err(TransportError::UnsupportedTransport),
        Endpoint::UnixRendezvous { path, port } => {
            let socket = UnixSocket::new_stream().map_err(|source| {
                TransportError::SocketCreation {
                    endpoint: endpoint.to_string(),
                    source,
                }
            })?;
            let stream = with_deadline(endpoint, deadline, socket.connect(path)).await?;
            let mut conn = Connection::Unix(stream);
            let reply = handshake(&mut conn, *port)
                .await
                .map_err(|source| TransportError::Handshake {
                    endpoint: endpoint.to_string(),
                    source,
                })?;
            debug!(
                "Rendezvous {endpoint} acknowledged: {:?}",
                String::from_utf8_lossy(&reply).trim_end()
            );
            Ok(conn)
        }
    }
}

/// Connect to `target`/`port`, a context id or a rendezvous socket path.
///
/// `deadline` bounds the connect step only, `None` leaves it to the OS.
///
/// # Errors
/// Return `Err` on resolution, connect, timeout, or handshake failure; the
/// socket is closed in all these cases
pub async fn dial(
    target: &str,
    port: u32,
    deadline: Option<Duration>,
) -> Result<Connection, TransportError> {
    let endpoint = resolve(Some(target), port, Purpose::Dial)?;
    debug!("Dialing {endpoint} port {port}, deadline {deadline:?}");
    connect(&endpoint, deadline).await
}
