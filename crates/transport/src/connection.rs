// SPDX-FileCopyrightText: 2025-2026 The vperf contributors
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::UnixStream;
#[cfg(any(target_os = "linux", target_os = "android"))]
use tokio_vsock::VsockStream;

/// Connected socket of either address family
pub enum Connection {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Vsock(VsockStream),
    Unix(UnixStream),
}

macro_rules! forward_poll {
    ($self:ident, $method:ident $(, $args:expr )* ) => {
        match $self.get_mut() {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Connection::Vsock(inner) => Pin::new(inner).$method($($args),*),
            Connection::Unix(inner) => Pin::new(inner).$method($($args),*),
        }
    };
}

impl Connection {
    #[must_use]
    pub fn family(&self) -> &'static str {
        match self {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Self::Vsock(_) => "vsock",
            Self::Unix(_) => "unix",
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Connection").field(&self.family()).finish()
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        forward_poll!(self, poll_read, cx, buf)
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        forward_poll!(self, poll_write, cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        forward_poll!(self, poll_flush, cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        forward_poll!(self, poll_shutdown, cx)
    }
}

impl From<UnixStream> for Connection {
    fn from(stream: UnixStream) -> Self {
        Self::Unix(stream)
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl From<VsockStream> for Connection {
    fn from(stream: VsockStream) -> Self {
        Self::Vsock(stream)
    }
}
