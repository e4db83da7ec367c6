// SPDX-FileCopyrightText: 2025-2026 The vperf contributors
// SPDX-License-Identifier: Apache-2.0

use std::io;

use async_trait::async_trait;
use tracing::{debug, error};

use vperf_common::error::TransportError;

use crate::auth::{accept_stream, connect_stream};
use crate::listener::Listener;
use crate::session::Session;
use crate::stream::DataStream;

/// Operations the measurement engine expects from a transport backend
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Backend specific preparation, before any socket exists
    ///
    /// # Errors
    /// Return `Err` if the backend can't run here
    fn init(&self, session: &mut Session) -> Result<(), TransportError>;

    /// Bind the control listener, later shared by all data streams
    ///
    /// # Errors
    /// Return `Err` if resolution or binding fails
    fn announce(
        &self,
        session: &mut Session,
        local: Option<&str>,
        port: u32,
    ) -> Result<(), TransportError>;

    /// Listener for data streams
    ///
    /// # Errors
    /// Return `Err` if no listener was announced
    fn listen<'a>(&self, session: &'a Session) -> Result<&'a Listener, TransportError>;

    async fn accept(&self, session: &Session) -> Result<DataStream, TransportError>;

    async fn connect(
        &self,
        session: &Session,
        server: &str,
        port: u32,
    ) -> Result<DataStream, TransportError>;

    async fn recv(&self, stream: &mut DataStream) -> Result<usize, TransportError>;

    async fn send(&self, stream: &mut DataStream) -> Result<usize, TransportError>;
}

fn not_announced() -> TransportError {
    TransportError::BindOrListen {
        endpoint: "<none>".into(),
        source: io::Error::new(io::ErrorKind::NotConnected, "control listener not announced"),
    }
}

pub struct VsockTransport;

#[async_trait]
impl Transport for VsockTransport {
    fn name(&self) -> &'static str {
        "vsock"
    }

    fn init(&self, _session: &mut Session) -> Result<(), TransportError> {
        Ok(())
    }

    fn announce(
        &self,
        session: &mut Session,
        local: Option<&str>,
        port: u32,
    ) -> Result<(), TransportError> {
        session.set_listener(Listener::announce(local, port)?);
        Ok(())
    }

    // Control and data connections share one listener, the cookie tells them apart
    fn listen<'a>(&self, session: &'a Session) -> Result<&'a Listener, TransportError> {
        session.listener().ok_or_else(not_announced)
    }

    async fn accept(&self, session: &Session) -> Result<DataStream, TransportError> {
        let listener = session.listener().ok_or_else(not_announced)?;
        let conn = accept_stream(listener, &session.cookie).await?;
        Ok(session.open_stream(conn))
    }

    async fn connect(
        &self,
        session: &Session,
        server: &str,
        port: u32,
    ) -> Result<DataStream, TransportError> {
        let deadline = session.settings.connect_timeout;
        let conn = connect_stream(server, port, deadline, &session.cookie).await?;
        debug!("Connected {} stream to {server} port {port}", conn.family());
        Ok(session.open_stream(conn))
    }

    async fn recv(&self, stream: &mut DataStream) -> Result<usize, TransportError> {
        stream.recv().await
    }

    async fn send(&self, stream: &mut DataStream) -> Result<usize, TransportError> {
        stream.send().await
    }
}

/// Stand-in for platforms without VSOCK: every operation fails
pub struct UnsupportedTransport;

fn not_supported<T>() -> Result<T, TransportError> {
    error!("VSOCK not supported");
    Err(TransportError::UnsupportedTransport)
}

#[async_trait]
impl Transport for UnsupportedTransport {
    fn name(&self) -> &'static str {
        "vsock (unsupported)"
    }

    fn init(&self, _session: &mut Session) -> Result<(), TransportError> {
        not_supported()
    }

    fn announce(
        &self,
        _session: &mut Session,
        _local: Option<&str>,
        _port: u32,
    ) -> Result<(), TransportError> {
        not_supported()
    }

    fn listen<'a>(&self, _session: &'a Session) -> Result<&'a Listener, TransportError> {
        not_supported()
    }

    async fn accept(&self, _session: &Session) -> Result<DataStream, TransportError> {
        not_supported()
    }

    async fn connect(
        &self,
        _session: &Session,
        _server: &str,
        _port: u32,
    ) -> Result<DataStream, TransportError> {
        not_supported()
    }

    async fn recv(&self, _stream: &mut DataStream) -> Result<usize, TransportError> {
        not_supported()
    }

    async fn send(&self, _stream: &mut DataStream) -> Result<usize, TransportError> {
        not_supported()
    }
}

/// Pick the backend for this platform, once at startup
#[must_use]
pub fn select_transport() -> Box<dyn Transport> {
    if cfg!(any(target_os = "linux", target_os = "android")) {
        Box::new(VsockTransport)
    } else {
        Box::new(UnsupportedTransport)
    }
}
