// SPDX-FileCopyrightText: 2025-2026 The vperf contributors
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::time::Duration;

use strum::{Display, EnumIter, IntoStaticStr};
use thiserror::Error;

/// Side-channel code reported next to every failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "kebab-case")]
#[repr(i32)]
pub enum ErrorCode {
    UnsupportedTransport = 1,
    AddressResolution = 2,
    SocketCreation = 3,
    BindOrListen = 4,
    ConnectTimeout = 5,
    Connect = 6,
    Handshake = 7,
    CookieReceive = 8,
    CookieMismatch = 9,
    StreamConnect = 10,
    MessageSend = 11,
    StreamIo = 12,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("VSOCK not supported")]
    UnsupportedTransport,

    #[error("Unable to resolve endpoint {spec:?}: {reason}")]
    AddressResolution { spec: String, reason: &'static str },

    #[error("Unable to create socket for {endpoint}")]
    SocketCreation {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("Unable to bind or listen on {endpoint}")]
    BindOrListen {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("Connecting to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout { endpoint: String, timeout: Duration },

    #[error("Unable to connect to {endpoint}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("Rendezvous handshake with {endpoint} failed")]
    Handshake {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("Unable to receive cookie")]
    CookieReceive(#[source] io::Error),

    #[error("Access denied: stream presented a foreign cookie")]
    CookieMismatch,

    #[error("Unable to connect stream")]
    StreamConnect(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("Unable to send message to peer")]
    MessageSend(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransportError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedTransport => ErrorCode::UnsupportedTransport,
            Self::AddressResolution { .. } => ErrorCode::AddressResolution,
            Self::SocketCreation { .. } => ErrorCode::SocketCreation,
            Self::BindOrListen { .. } => ErrorCode::BindOrListen,
            Self::ConnectTimeout { .. } => ErrorCode::ConnectTimeout,
            Self::Connect { .. } => ErrorCode::Connect,
            Self::Handshake { .. } => ErrorCode::Handshake,
            Self::CookieReceive(_) => ErrorCode::CookieReceive,
            Self::CookieMismatch => ErrorCode::CookieMismatch,
            Self::StreamConnect(_) => ErrorCode::StreamConnect,
            Self::MessageSend(_) => ErrorCode::MessageSend,
            Self::Io(_) => ErrorCode::StreamIo,
        }
    }

    /// True when retrying with another stream can't help and the whole run should stop
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedTransport
                | Self::AddressResolution { .. }
                | Self::SocketCreation { .. }
                | Self::BindOrListen { .. }
        )
    }

    pub(crate) fn resolution(spec: impl Into<String>, reason: &'static str) -> Self {
        Self::AddressResolution {
            spec: spec.into(),
            reason,
        }
    }
}
