// SPDX-FileCopyrightText: 2025-2026 The vperf contributors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use vperf_common::types::{Cookie, StateHandle};

use crate::session::Session;

pub const DEFAULT_BLOCK_SIZE: usize = 128 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    pub block_size: usize,
    // None blocks until the OS gives up
    pub connect_timeout: Option<Duration>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            connect_timeout: None,
        }
    }
}

pub struct SessionConfig {
    pub(crate) cookie: Cookie,
    pub(crate) settings: StreamSettings,
    pub(crate) state: StateHandle,
    pub(crate) debug: bool,
}

impl SessionConfig {
    #[must_use]
    pub fn new(cookie: Cookie) -> SessionConfig {
        SessionConfig {
            cookie,
            settings: StreamSettings::default(),
            state: StateHandle::default(),
            debug: false,
        }
    }

    #[must_use]
    pub fn set_block_size(self, block_size: usize) -> SessionConfig {
        Self {
            settings: StreamSettings {
                block_size,
                ..self.settings
            },
            ..self
        }
    }

    #[must_use]
    pub fn set_connect_timeout(self, timeout: Duration) -> SessionConfig {
        Self {
            settings: StreamSettings {
                connect_timeout: Some(timeout),
                ..self.settings
            },
            ..self
        }
    }

    /// Share run-state with an orchestrator that already owns a handle
    #[must_use]
    pub fn set_state(self, state: StateHandle) -> SessionConfig {
        Self { state, ..self }
    }

    #[must_use]
    pub fn set_debug(self, debug: bool) -> SessionConfig {
        Self { debug, ..self }
    }

    #[must_use]
    pub fn build(self) -> Session {
        Session::new(self)
    }
}
