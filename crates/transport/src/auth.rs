// SPDX-FileCopyrightText: 2025-2026 The vperf contributors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use vperf_common::error::TransportError;
use vperf_common::types::{ACCESS_DENIED, COOKIE_SIZE, Cookie};

use crate::connection::Connection;
use crate::dialer::dial;
use crate::listener::Listener;

/// Read the cookie presented by a fresh stream and check it against `expected`.
///
/// A foreign cookie gets the `ACCESS_DENIED` byte back before the error is
/// returned; the caller is expected to drop the connection.
///
/// # Errors
/// * `CookieReceive` if fewer than `COOKIE_SIZE` bytes arrive
/// * `MessageSend` if the rejection byte can't be written
/// * `CookieMismatch` if the cookie belongs to another session
pub async fn verify_cookie<S>(conn: &mut S, expected: &Cookie) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut presented = [0u8; COOKIE_SIZE];
    conn.read_exact(&mut presented)
        .await
        .map_err(TransportError::CookieReceive)?;

    if Cookie::from_bytes(presented) == *expected {
        return Ok(());
    }

    warn!("Rejecting stream with foreign cookie");
    conn.write_all(&[ACCESS_DENIED])
        .await
        .map_err(TransportError::MessageSend)?;
    // peer may already be gone, the rejection is best effort from here on
    let _ = conn.shutdown().await;
    Err(TransportError::CookieMismatch)
}

/// Accept the next stream on the shared listener and admit it only if it
/// presents the session cookie. Rejected connections are closed.
///
/// # Errors
/// Return `Err` if accept fails, or the cookie can't be read or doesn't match
pub async fn accept_stream(
    listener: &Listener,
    expected: &Cookie,
) -> Result<Connection, TransportError> {
    let mut conn = listener
        .accept()
        .await
        .map_err(|err| TransportError::StreamConnect(Box::new(err)))?;
    verify_cookie(&mut conn, expected).await?;
    debug!("Admitted {} stream", conn.family());
    Ok(conn)
}

/// Dial `target`/`port` and present the session cookie.
///
/// # Errors
/// Return `StreamConnect` wrapping the dial or write failure
pub async fn connect_stream(
    target: &str,
    port: u32,
    deadline: Option<Duration>,
    cookie: &Cookie,
) -> Result<Connection, TransportError> {
    let mut conn = dial(target, port, deadline)
        .await
        .map_err(|err| TransportError::StreamConnect(Box::new(err)))?;
    conn.write_all(cookie.as_bytes())
        .await
        .map_err(|err| TransportError::StreamConnect(Box::new(err)))?;
    Ok(conn)
}
