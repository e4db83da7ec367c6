// SPDX-FileCopyrightText: 2025-2026 The vperf contributors
// SPDX-License-Identifier: Apache-2.0

use vperf_common::types::{Cookie, StateHandle, TestState};

use crate::config::{SessionConfig, StreamSettings};
use crate::connection::Connection;
use crate::listener::Listener;
use crate::stream::DataStream;

/// Per-test state shared by the control connection and every data stream
pub struct Session {
    pub(crate) cookie: Cookie,
    pub(crate) settings: StreamSettings,
    pub(crate) state: StateHandle,
    pub(crate) debug: bool,
    pub(crate) listener: Option<Listener>,
}

impl Session {
    pub(crate) fn new(config: SessionConfig) -> Self {
        Self {
            cookie: config.cookie,
            settings: config.settings,
            state: config.state,
            debug: config.debug,
            listener: None,
        }
    }

    #[must_use]
    pub fn cookie(&self) -> &Cookie {
        &self.cookie
    }

    #[must_use]
    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    #[must_use]
    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    pub fn set_state(&self, state: TestState) {
        self.state.set(state);
    }

    #[must_use]
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    #[must_use]
    pub fn listener(&self) -> Option<&Listener> {
        self.listener.as_ref()
    }

    /// Hand over a listener bound elsewhere, replacing the current one
    pub fn set_listener(&mut self, listener: Listener) {
        self.listener = Some(listener);
    }

    pub(crate) fn open_stream(&self, conn: Connection) -> DataStream {
        DataStream::new(conn, &self.settings, self.state.clone(), self.debug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn config_builder_fills_session() {
        let cookie = Cookie::generate();
        let state = StateHandle::new(TestState::ParamExchange);
        let session = SessionConfig::new(cookie.clone())
            .set_block_size(4096)
            .set_connect_timeout(Duration::from_secs(3))
            .set_state(state.clone())
            .set_debug(true)
            .build();

        assert_eq!(session.cookie(), &cookie);
        assert_eq!(session.settings().block_size, 4096);
        assert_eq!(session.settings().connect_timeout, Some(Duration::from_secs(3)));
        assert!(session.is_debug());
        assert!(session.listener().is_none());

        session.set_state(TestState::Running);
        assert!(state.is_running());
    }
}
