// SPDX-FileCopyrightText: 2025-2026 The vperf contributors
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::path::{Path, PathBuf};

#[cfg(any(target_os = "linux", target_os = "android"))]
use socket2::{Domain, SockAddr, Socket, Type};
use tokio::net::{UnixListener, UnixSocket};
#[cfg(any(target_os = "linux", target_os = "android"))]
use tokio_vsock::VsockListener;
use tracing::{debug, info, warn};

use vperf_common::address::{Endpoint, Purpose, resolve};
use vperf_common::error::TransportError;

use crate::connection::Connection;

// Kernel clamps this to net.core.somaxconn
const LISTEN_BACKLOG: i32 = i32::MAX;

/// Listening socket shared by the control connection and all data streams
pub enum Listener {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Vsock {
        listener: VsockListener,
        endpoint: Endpoint,
    },
    Unix {
        listener: UnixListener,
        endpoint: Endpoint,
    },
}

// AF_UNIX socket files outlive their sockets
pub(crate) fn remove_stale_socket(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed rendezvous socket {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn bind_unix(path: &Path, endpoint: &Endpoint) -> Result<UnixListener, TransportError> {
    let bind_err = |source| TransportError::BindOrListen {
        endpoint: endpoint.to_string(),
        source,
    };
    remove_stale_socket(path).map_err(bind_err)?;
    let socket = UnixSocket::new_stream().map_err(|source| TransportError::SocketCreation {
        endpoint: endpoint.to_string(),
        source,
    })?;
    // SO_REUSEADDR is meaningless for AF_UNIX, removing the stale file covers restarts
    socket.bind(path).map_err(bind_err)?;
    socket.listen(LISTEN_BACKLOG.unsigned_abs()).map_err(bind_err)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn bind_vsock(cid: u32, port: u32, endpoint: &Endpoint) -> Result<VsockListener, TransportError> {
    use std::os::fd::{FromRawFd, IntoRawFd};

    let bind_err = |source| TransportError::BindOrListen {
        endpoint: endpoint.to_string(),
        source,
    };
    let socket = Socket::new(Domain::VSOCK, Type::STREAM, None).map_err(|source| {
        TransportError::SocketCreation {
            endpoint: endpoint.to_string(),
            source,
        }
    })?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    socket.bind(&SockAddr::vsock(cid, port)).map_err(bind_err)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;
    // SAFETY: the descriptor is a listening AF_VSOCK socket whose ownership moves here
    Ok(unsafe { VsockListener::from_raw_fd(socket.into_raw_fd()) })
}

impl Listener {
    /// Bind and listen on a resolved listening endpoint.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Return `Err` if the socket can't be created, bound, or put into listening state
    pub fn bind(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let listener = match endpoint {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Endpoint::Vsock { cid, port } => Self::Vsock {
                listener: bind_vsock(*cid, *port, endpoint)?,
                endpoint: endpoint.clone(),
            },
            #[cfg(not(any(target_os = "linux", target_os = "android")))]
            Endpoint::Vsock { .. } => return Err(TransportError::UnsupportedTransport),
            Endpoint::UnixRendezvous { path, .. } => Self::Unix {
                listener: bind_unix(path, endpoint)?,
                endpoint: endpoint.clone(),
            },
        };
        info!("Listening on {endpoint}");
        Ok(listener)
    }

    /// Resolve `local` for listening and bind to it; `None` listens on any context id
    ///
    /// # Errors
    /// Return `Err` if resolution or binding fails
    pub fn announce(local: Option<&str>, port: u32) -> Result<Self, TransportError> {
        let endpoint = resolve(local, port, Purpose::Listen)?;
        Self::bind(&endpoint)
    }

    #[must_use]
    pub fn local_endpoint(&self) -> &Endpoint {
        match self {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Self::Vsock { endpoint, .. } => endpoint,
            Self::Unix { endpoint, .. } => endpoint,
        }
    }

    /// Wait for the next incoming connection. Several accepts may wait on
    /// one listener at the same time.
    ///
    /// # Errors
    /// Return `Err` if `accept(2)` fails
    pub async fn accept(&self) -> io::Result<Connection> {
        match self {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Self::Vsock { listener, .. } => {
                let (stream, peer) = listener.accept().await?;
                debug!("Accepted vsock connection from {}:{}", peer.cid(), peer.port());
                Ok(Connection::Vsock(stream))
            }
            Self::Unix { listener, endpoint } => {
                let (stream, _) = listener.accept().await?;
                debug!("Accepted connection on {endpoint}");
                Ok(Connection::Unix(stream))
            }
        }
    }

    fn unix_path(&self) -> Option<PathBuf> {
        match self {
            Self::Unix { endpoint, .. } => endpoint.unix_path().map(Path::to_path_buf),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Self::Vsock { .. } => None,
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(path) = self.unix_path() {
            if let Err(err) = remove_stale_socket(&path) {
                warn!("Unable to remove rendezvous socket {}: {err}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vperf_common::error::ErrorCode;

    #[tokio::test]
    async fn rebinding_same_target_succeeds() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let base = dir.path().join("vm.sock");
        let base = base.to_str().unwrap();

        let first = Listener::announce(Some(base), 5201)?;
        let path = first.local_endpoint().unix_path().unwrap().to_path_buf();
        assert!(path.ends_with("vm.sock_5201"));
        // process "crashes": socket file stays behind
        std::mem::forget(first);
        assert!(path.exists());

        let second = Listener::announce(Some(base), 5201)?;
        assert_eq!(second.local_endpoint().unix_path(), Some(path.as_path()));
        drop(second);
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn stale_socket_from_std_listener_is_replaced() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("stale_7000");
        drop(std::os::unix::net::UnixListener::bind(&path)?);
        assert!(path.exists());

        let endpoint = Endpoint::UnixRendezvous {
            path: path.clone(),
            port: 7000,
        };
        let _listener = Listener::bind(&endpoint)?;
        Ok(())
    }

    #[tokio::test]
    async fn bind_in_missing_directory_fails() {
        let endpoint = Endpoint::UnixRendezvous {
            path: PathBuf::from("/nonexistent-vperf-dir/vm.sock_5201"),
            port: 5201,
        };
        let err = Listener::bind(&endpoint).err().unwrap();
        assert_eq!(err.code(), ErrorCode::BindOrListen);
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn accepts_plain_unix_connection() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let base = dir.path().join("srv");
        let listener = Listener::announce(base.to_str(), 1)?;
        let path = listener.local_endpoint().unix_path().unwrap().to_path_buf();

        let (accepted, connected) = tokio::join!(
            listener.accept(),
            tokio::net::UnixStream::connect(&path)
        );
        assert_eq!(accepted?.family(), "unix");
        connected?;
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_accepts_share_listener() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let base = dir.path().join("srv");
        let listener = Listener::announce(base.to_str(), 2)?;
        let path = listener.local_endpoint().unix_path().unwrap().to_path_buf();

        let (first, second, a, b) = tokio::join!(
            listener.accept(),
            listener.accept(),
            tokio::net::UnixStream::connect(&path),
            tokio::net::UnixStream::connect(&path)
        );
        first?;
        second?;
        a?;
        b?;
        Ok(())
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[tokio::test]
    async fn vsock_listener_reuses_address() -> anyhow::Result<()> {
        use std::os::fd::{AsRawFd, BorrowedFd};

        let listener = match Listener::announce(None, 52_011) {
            Ok(listener) => listener,
            // host without AF_VSOCK or without a vsock transport
            Err(TransportError::SocketCreation { .. }) => return Ok(()),
            Err(TransportError::BindOrListen { source, .. })
                if source.kind() == io::ErrorKind::AddrNotAvailable =>
            {
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let Listener::Vsock { listener: inner, .. } = &listener else {
            panic!("wildcard address must bind a vsock listener");
        };
        let fd = unsafe { BorrowedFd::borrow_raw(inner.as_raw_fd()) };
        assert!(socket2::SockRef::from(&fd).reuse_address()?);
        drop(listener);

        // rebinding right away works
        Listener::announce(None, 52_011)?;
        Ok(())
    }
}
