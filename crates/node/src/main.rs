use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use clap::{Parser, Subcommand};
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};

use pong_net::net::DEFAULT_TIMEOUT_SECS;
use pong_net::{DEFAULT_PORT, DEFAULT_TICK_RATE, EngineConfig, EngineEvent, ProtocolEngine};

#[derive(Parser)]
#[command(name = "pong-node")]
#[command(about = "Peer-to-peer Pong network node")]
struct Args {
    #[command(subcommand)]
    role: Role,

    #[arg(short, long, global = true, default_value = "0.0.0.0")]
    bind: String,

    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT_SECS, help = "Seconds of silence before a peer is dropped")]
    timeout: f32,

    #[arg(short, long, global = true, default_value_t = DEFAULT_TICK_RATE)]
    tick_rate: u32,
}

#[derive(Subcommand)]
enum Role {
    /// Host a match and wait for two players
    Server {
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Join a hosted match
    Client {
        #[arg(short, long, default_value = "127.0.0.1")]
        address: String,

        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        paddle: f32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    ensure!(
        args.timeout.is_finite() && args.timeout > 0.0,
        "timeout must be a positive number of seconds"
    );
    ensure!(args.tick_rate > 0, "tick rate must be at least 1");

    let bind_address: IpAddr = args
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", args.bind))?;

    let config = EngineConfig {
        bind_address,
        tick_rate: args.tick_rate,
        ..Default::default()
    }
    .with_timeout_secs(args.timeout)
    .with_context(|| format!("invalid timeout {}", args.timeout))?;
    let tick = config.tick_duration();

    let mut engine = ProtocolEngine::new(config, Handle::current());
    match &args.role {
        Role::Server { port } => engine.enable_server(*port)?,
        Role::Client {
            address,
            port,
            paddle,
        } => {
            engine.set_local_paddle(*paddle);
            engine.enable_client(address, *port)?;
        }
    }

    run(&mut engine, tick).await?;

    let stats = engine.stats();
    log::info!(
        "Sent {} packets ({} bytes), received {} ({} bytes), dropped {}",
        stats.packets_sent,
        stats.bytes_sent,
        stats.packets_received,
        stats.bytes_received,
        stats.packets_dropped
    );

    if engine.is_server_active() {
        engine.disable_server()?;
    } else if engine.is_client_active() {
        engine.disable_client()?;
    }
    log_events(&mut engine);

    Ok(())
}

/// Ticks the engine until Ctrl-C or until the active role ends on its own.
async fn run(engine: &mut ProtocolEngine, tick: Duration) -> Result<()> {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut last_tick = Instant::now();
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("failed to listen for Ctrl-C")?;
                log::info!("Shutting down");
                return Ok(());
            }
            now = interval.tick() => {
                engine.tick(now - last_tick);
                last_tick = now;

                if log_events(engine) {
                    return Ok(());
                }
            }
        }
    }
}

/// Logs pending events and reports whether the role has ended.
fn log_events(engine: &mut ProtocolEngine) -> bool {
    let mut ended = false;
    for event in engine.drain_events() {
        match event {
            EngineEvent::PeerJoined {
                slot,
                peer_id,
                endpoint,
            } => log::info!("Player {} joined as {} from {}", slot + 1, peer_id, endpoint),
            EngineEvent::PeerLeft {
                slot,
                peer_id,
                reason,
            } => log::info!("Player {} ({}) {}", slot + 1, peer_id, reason.as_str()),
            EngineEvent::PeerRejected { endpoint } => {
                log::info!("Turned away {}, match is full", endpoint)
            }
            EngineEvent::Connected { server, client_id } => {
                log::info!("Joined {} as {}", server, client_id)
            }
            EngineEvent::ClientDisconnected { reason } => {
                log::info!("Client {}", reason.as_str());
                ended = true;
            }
            EngineEvent::ServerStopped { reason } => {
                log::info!("Server {}", reason.as_str());
                ended = true;
            }
        }
    }
    ended
}
