use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info, warn};

use vperf::config::DEFAULT_BLOCK_SIZE;
use vperf::relay::Relay;
use vperf::types::{Cookie, StreamStats, TestState};
use vperf::{SessionConfig, select_transport};

#[derive(Debug, Parser)]
#[command(name = "vperf")]
#[command(about = "VSOCK transport probe", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Accept authenticated streams and count what they send
    Server {
        /// Context id or rendezvous base path; any context id when omitted
        #[arg(long)]
        bind: Option<String>,

        #[arg(long, env = "VPERF_PORT", default_value_t = 5201)]
        port: u32,

        /// Session cookie, generated when omitted
        #[arg(long, env = "VPERF_COOKIE")]
        cookie: Option<Cookie>,

        #[arg(long, default_value_t = 1)]
        streams: usize,

        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE, value_parser = parse_block_size)]
        block_size: usize,
    },

    /// Dial a server and push blocks through one stream
    Client {
        /// Context id or rendezvous socket path of the server
        #[arg(long)]
        connect: String,

        #[arg(long, env = "VPERF_PORT", default_value_t = 5201)]
        port: u32,

        #[arg(long, env = "VPERF_COOKIE")]
        cookie: Cookie,

        #[arg(long, default_value_t = 1024)]
        blocks: u64,

        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE, value_parser = parse_block_size)]
        block_size: usize,

        #[arg(long)]
        connect_timeout_ms: Option<u64>,
    },

    /// Answer CONNECT handshakes on a rendezvous path, like a hypervisor muxer
    Relay {
        #[arg(long)]
        uds: String,
    },
}

fn parse_block_size(arg: &str) -> Result<usize, String> {
    match arg.parse::<usize>() {
        Ok(0) => Err("block size must be positive".into()),
        Ok(size) => Ok(size),
        Err(err) => Err(err.to_string()),
    }
}

#[derive(Debug, Serialize)]
struct StreamReport {
    stream: usize,
    #[serde(flatten)]
    stats: StreamStats,
}

async fn run_server(
    bind: Option<String>,
    port: u32,
    cookie: Option<Cookie>,
    streams: usize,
    block_size: usize,
) -> anyhow::Result<()> {
    let transport = select_transport();
    let cookie = cookie.unwrap_or_else(Cookie::generate);
    info!("Session cookie {}", String::from_utf8_lossy(cookie.text()));
    let mut session = SessionConfig::new(cookie)
        .set_block_size(block_size)
        .set_debug(tracing::enabled!(tracing::Level::DEBUG))
        .build();

    transport.init(&mut session)?;
    transport
        .announce(&mut session, bind.as_deref(), port)
        .context("While announcing listener")?;
    let endpoint = transport.listen(&session)?.local_endpoint().clone();
    info!("Waiting for {streams} stream(s) on {endpoint} via {}", transport.name());

    let mut admitted = 0;
    while admitted < streams {
        let mut stream = match transport.accept(&session).await {
            Ok(stream) => stream,
            Err(err) if !err.is_fatal() => {
                warn!("Dropping stream: {err} ({})", err.code());
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        admitted += 1;
        session.set_state(TestState::Running);
        while transport.recv(&mut stream).await? > 0 {}
        session.set_state(TestState::TestEnd);

        let report = StreamReport {
            stream: admitted,
            stats: *stream.stats(),
        };
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(())
}

async fn run_client(
    connect: String,
    port: u32,
    cookie: Cookie,
    blocks: u64,
    block_size: usize,
    connect_timeout_ms: Option<u64>,
) -> anyhow::Result<()> {
    let transport = select_transport();
    let mut config = SessionConfig::new(cookie).set_block_size(block_size);
    if let Some(ms) = connect_timeout_ms {
        config = config.set_connect_timeout(Duration::from_millis(ms));
    }
    let mut session = config.build();
    transport.init(&mut session)?;

    let mut stream = transport
        .connect(&session, &connect, port)
        .await
        .with_context(|| format!("While connecting to {connect} port {port}"))?;
    stream.fill_buffer(b"0123456789abcdef");

    session.set_state(TestState::Running);
    for _ in 0..blocks {
        if transport.send(&mut stream).await? == 0 {
            warn!("Server went away");
            break;
        }
    }
    session.set_state(TestState::TestEnd);

    let report = StreamReport {
        stream: 1,
        stats: *stream.stats(),
    };
    stream.close().await?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vperf::trace_init()?;

    let cli = Cli::parse();
    debug!("CLI is {:#?}", cli);

    match cli.command {
        Commands::Server {
            bind,
            port,
            cookie,
            streams,
            block_size,
        } => run_server(bind, port, cookie, streams, block_size).await,
        Commands::Client {
            connect,
            port,
            cookie,
            blocks,
            block_size,
            connect_timeout_ms,
        } => run_client(connect, port, cookie, blocks, block_size, connect_timeout_ms).await,
        Commands::Relay { uds } => {
            let relay = Relay::bind(uds)?;
            relay.serve().await?;
            Ok(())
        }
    }
}
