// SPDX-FileCopyrightText: 2025-2026 The vperf contributors
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use rand::Rng;
use serde::Serialize;
use strum::{Display, FromRepr};
use thiserror::Error;

/// Cookie length on the wire: 36 characters plus the terminating NUL
pub const COOKIE_SIZE: usize = 37;

/// Rejection byte sent to a stream with a foreign cookie (signed -1 on the wire)
pub const ACCESS_DENIED: u8 = 0xFF;

const COOKIE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz234567";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CookieError {
    #[error("Cookie must be at most {max} bytes, got {len}")]
    TooLong { len: usize, max: usize },
    #[error("Cookie must not contain NUL bytes")]
    EmbeddedNul,
}

/// Session token, presented by every stream right after connect.
///
/// Equality follows C string semantics: bytes after the first NUL are ignored.
#[derive(Clone)]
pub struct Cookie([u8; COOKIE_SIZE]);

impl Cookie {
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut bytes = [0u8; COOKIE_SIZE];
        for byte in bytes.iter_mut().take(COOKIE_SIZE - 1) {
            *byte = COOKIE_ALPHABET[rng.random_range(0..COOKIE_ALPHABET.len())];
        }
        Self(bytes)
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; COOKIE_SIZE]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; COOKIE_SIZE] {
        &self.0
    }

    /// Bytes up to (not including) the first NUL
    #[must_use]
    pub fn text(&self) -> &[u8] {
        let end = self
            .0
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(COOKIE_SIZE);
        &self.0[..end]
    }
}

impl PartialEq for Cookie {
    fn eq(&self, other: &Self) -> bool {
        self.text() == other.text()
    }
}

impl Eq for Cookie {}

impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cookie")
            .field(&String::from_utf8_lossy(self.text()))
            .finish()
    }
}

impl FromStr for Cookie {
    type Err = CookieError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let max = COOKIE_SIZE - 1;
        if s.len() > max {
            return Err(CookieError::TooLong { len: s.len(), max });
        }
        if s.bytes().any(|b| b == 0) {
            return Err(CookieError::EmbeddedNul);
        }
        let mut bytes = [0u8; COOKIE_SIZE];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Ok(Self(bytes))
    }
}

/// Run-state of a test, as driven by the orchestrator
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Display, FromRepr, Serialize)]
#[repr(u8)]
pub enum TestState {
    #[default]
    NotStarted = 0,
    TestStart = 1,
    Running = 2,
    TestEnd = 4,
    ParamExchange = 9,
    CreateStreams = 10,
    ServerTerminate = 11,
    ClientTerminate = 12,
    ExchangeResults = 13,
    DisplayResults = 14,
    IperfStart = 15,
    IperfDone = 16,
}

/// Shared view of the session run-state.
///
/// The orchestrator flips it, streams only read it.
#[derive(Clone, Debug, Default)]
pub struct StateHandle(Arc<AtomicU8>);

impl StateHandle {
    #[must_use]
    pub fn new(state: TestState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    #[must_use]
    pub fn get(&self) -> TestState {
        TestState::from_repr(self.0.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn set(&self, state: TestState) {
        self.0.store(state as u8, Ordering::Release);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.get() == TestState::Running
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent_this_interval: u64,
    pub bytes_received_this_interval: u64,
}

impl StreamStats {
    pub fn record_sent(&mut self, n: usize) {
        let n = n as u64;
        self.bytes_sent += n;
        self.bytes_sent_this_interval += n;
    }

    pub fn record_received(&mut self, n: usize) {
        let n = n as u64;
        self.bytes_received += n;
        self.bytes_received_this_interval += n;
    }

    pub fn reset_interval(&mut self) {
        self.bytes_sent_this_interval = 0;
        self.bytes_received_this_interval = 0;
    }
}
