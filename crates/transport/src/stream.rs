// SPDX-FileCopyrightText: 2025-2026 The vperf contributors
// SPDX-License-Identifier: Apache-2.0

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

use vperf_common::error::TransportError;
use vperf_common::types::{StateHandle, StreamStats};

use crate::config::StreamSettings;
use crate::connection::Connection;

/// Authenticated data stream with its byte counters.
///
/// Owned by the single task driving it, hence `&mut self` everywhere.
pub struct DataStream<S = Connection> {
    io: S,
    buffer: Vec<u8>,
    stats: StreamStats,
    state: StateHandle,
    debug: bool,
}

// VSOCK reports an orderly remote close as ENOTCONN instead of EOF
fn peer_closed_as_eof(result: io::Result<usize>) -> io::Result<usize> {
    match result {
        Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(0),
        other => other,
    }
}

impl<S> DataStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: S, settings: &StreamSettings, state: StateHandle, debug: bool) -> Self {
        Self {
            io,
            buffer: vec![0; settings.block_size],
            stats: StreamStats::default(),
            state,
            debug,
        }
    }

    #[must_use]
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn reset_interval(&mut self) {
        self.stats.reset_interval();
    }

    #[must_use]
    pub fn block_size(&self) -> usize {
        self.buffer.len()
    }

    /// Last block received, or the payload about to be sent
    #[must_use]
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Fill the send buffer by repeating `pattern`
    pub fn fill_buffer(&mut self, pattern: &[u8]) {
        if pattern.is_empty() {
            return;
        }
        for (byte, value) in self.buffer.iter_mut().zip(pattern.iter().cycle()) {
            *byte = *value;
        }
    }

    /// Read one block of at most `block_size` bytes.
    ///
    /// Bytes are only accounted while the test is running; late arrivals are
    /// returned but left out of the counters. `Ok(0)` means the peer is gone.
    ///
    /// # Errors
    /// Return `Err` if the read fails for any reason other than a closed peer
    pub async fn recv(&mut self) -> Result<usize, TransportError> {
        let received = peer_closed_as_eof(self.io.read(&mut self.buffer).await)?;
        if received > 0 {
            if self.state.is_running() {
                self.stats.record_received(received);
            } else if self.debug {
                info!("Late receive, state = {}", self.state.get());
            }
        }
        Ok(received)
    }

    /// Write one block of at most `block_size` bytes from the buffer.
    ///
    /// # Errors
    /// Return `Err` if the write fails for any reason other than a closed peer
    pub async fn send(&mut self) -> Result<usize, TransportError> {
        let sent = peer_closed_as_eof(self.io.write(&self.buffer).await)?;
        self.stats.record_sent(sent);
        Ok(sent)
    }

    /// Shut the write side down and drop the socket
    ///
    /// # Errors
    /// Return `Err` if shutdown fails on a still connected socket
    pub async fn close(mut self) -> Result<(), TransportError> {
        match self.io.shutdown().await {
            Err(err) if err.kind() != io::ErrorKind::NotConnected => Err(err.into()),
            _ => Ok(()),
        }
    }

    pub fn into_inner(self) -> S {
        self.io
    }
}
