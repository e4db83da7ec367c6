// SPDX-FileCopyrightText: 2025-2026 The vperf contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Context;

pub mod auth;
pub mod backend;
pub mod config;
pub mod connection;
pub mod dialer;
pub mod listener;
pub mod relay;
pub mod session;
pub mod stream;

pub use backend::{Transport, UnsupportedTransport, VsockTransport, select_transport};
pub use config::{SessionConfig, StreamSettings};
pub use connection::Connection;
pub use listener::Listener;
pub use session::Session;
pub use stream::DataStream;
pub use vperf_common::{address, error, types};

/// Init logging
///
/// # Errors
///
/// Will return `Err` if failed to initialize logging
pub fn trace_init() -> anyhow::Result<()> {
    use tracing::Level;
    use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt};

    let env_filter =
        EnvFilter::try_from_env("VPERF_LOG").unwrap_or_else(|_| EnvFilter::from("info"));
    let is_debug_log_level = env_filter
        .max_level_hint()
        .map_or_else(|| false, |level| level >= Level::DEBUG);

    let output = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(is_debug_log_level)
        .with_file(is_debug_log_level)
        .with_line_number(is_debug_log_level)
        .with_thread_ids(is_debug_log_level);

    let output = if is_debug_log_level {
        output.pretty().boxed()
    } else {
        output.boxed()
    };

    let subscriber = tracing_subscriber::registry().with(output.with_filter(env_filter));

    tracing::subscriber::set_global_default(subscriber)
        .context("tracing shouldn't already have been set up")?;
    Ok(())
}
