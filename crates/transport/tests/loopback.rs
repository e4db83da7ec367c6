// SPDX-FileCopyrightText: 2025-2026 The vperf contributors
// SPDX-License-Identifier: Apache-2.0

// Client and server of the Unix emulation, joined by an in-process relay

use std::path::{Path, PathBuf};
use std::time::Duration;

use vperf::error::ErrorCode;
use vperf::relay::Relay;
use vperf::types::{Cookie, TestState};
use vperf::{SessionConfig, Transport, VsockTransport};

const PORT: u32 = 5201;

fn spawn_relay(base: &Path) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let relay = Relay::bind(base)?;
    Ok(tokio::spawn(async move {
        let _ = relay.serve().await;
    }))
}

async fn push(base: PathBuf, cookie: Cookie, total: u64) -> anyhow::Result<u64> {
    let transport = VsockTransport;
    let session = SessionConfig::new(cookie)
        .set_block_size(1000)
        .set_connect_timeout(Duration::from_secs(5))
        .build();
    let server = base.to_str().unwrap_or_default().to_owned();
    let mut stream = transport.connect(&session, &server, PORT).await?;
    stream.fill_buffer(b"vperf");

    session.set_state(TestState::Running);
    while stream.stats().bytes_sent < total {
        if transport.send(&mut stream).await? == 0 {
            break;
        }
    }
    let sent = stream.stats().bytes_sent;
    stream.close().await?;
    Ok(sent)
}

#[tokio::test]
async fn authenticated_stream_through_relay() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let base = dir.path().join("vm.sock");
    let relay = spawn_relay(&base)?;

    let cookie = Cookie::generate();
    let transport = VsockTransport;
    let mut session = SessionConfig::new(cookie.clone()).set_block_size(4096).build();
    transport.announce(&mut session, base.to_str(), PORT)?;
    session.set_state(TestState::Running);

    let client = tokio::spawn(push(base.clone(), cookie, 10_000));

    let mut stream = transport.accept(&session).await?;
    while transport.recv(&mut stream).await? > 0 {}
    let sent = client.await??;

    assert!(sent >= 10_000);
    assert_eq!(stream.stats().bytes_received, sent);
    relay.abort();
    Ok(())
}

#[tokio::test]
async fn foreign_cookie_is_turned_away_and_next_stream_admitted() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let base = dir.path().join("vm.sock");
    let relay = spawn_relay(&base)?;

    let cookie = Cookie::generate();
    let transport = VsockTransport;
    let mut session = SessionConfig::new(cookie.clone()).build();
    transport.announce(&mut session, base.to_str(), PORT)?;

    let intruder = tokio::spawn(push(base.clone(), Cookie::generate(), 0));
    let err = transport.accept(&session).await.err().unwrap();
    assert_eq!(err.code(), ErrorCode::CookieMismatch);
    assert!(!err.is_fatal());
    intruder.await??;

    let client = tokio::spawn(push(base.clone(), cookie, 0));
    let stream = transport.accept(&session).await?;
    client.await??;
    assert_eq!(stream.stats().bytes_received, 0);
    relay.abort();
    Ok(())
}

#[tokio::test]
async fn missing_relay_is_a_stream_connect_failure() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let base = dir.path().join("absent.sock");
    let err = push(base, Cookie::generate(), 1).await.unwrap_err();
    let err = err.downcast::<vperf::error::TransportError>()?;
    assert_eq!(err.code(), ErrorCode::StreamConnect);
    assert!(!err.is_fatal());
    Ok(())
}
