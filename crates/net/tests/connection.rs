use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use glam::Vec2;
use tokio::runtime::Handle;

use pong_net::{
    ConnectionState, DisconnectReason, EngineConfig, EngineEvent, PongState, ProtocolEngine,
};

static PORT_COUNTER: AtomicU16 = AtomicU16::new(43000);

const FRAME: Duration = Duration::from_millis(16);

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(10, Ordering::SeqCst)
}

fn config() -> EngineConfig {
    EngineConfig {
        bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        ..Default::default()
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn start_server() -> (ProtocolEngine, u16) {
    init_logging();
    let mut server = ProtocolEngine::new(config(), Handle::current());
    server.enable_server(next_port()).unwrap();
    let port = server.local_addr().unwrap().port();
    (server, port)
}

fn start_client(port: u16) -> ProtocolEngine {
    let mut client = ProtocolEngine::new(config(), Handle::current());
    client.enable_client("127.0.0.1", port).unwrap();
    client
}

/// Ticks every engine until `done` holds or two seconds pass.
async fn pump<F>(engines: &mut [&mut ProtocolEngine], mut done: F) -> bool
where
    F: FnMut(&[&mut ProtocolEngine]) -> bool,
{
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(2) {
        for engine in engines.iter_mut() {
            engine.tick(FRAME);
        }
        if done(engines) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handshake_full_flow() {
    let (mut server, port) = start_server();
    let mut client = start_client(port);
    assert_eq!(client.client_state(), ConnectionState::Connecting);

    let connected = pump(&mut [&mut server, &mut client], |e| e[1].is_client_connected()).await;
    assert!(connected, "client never received ACCEPT");

    let peers = server.peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(Some(peers[0].peer_id), client.client_id());
    assert_eq!(peers[0].endpoint.port(), client.local_addr().unwrap().port());

    assert!(matches!(
        client.drain_events().next(),
        Some(EngineEvent::Connected { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_third_client_is_rejected() {
    let (mut server, port) = start_server();
    let mut first = start_client(port);
    let mut second = start_client(port);

    let ready = pump(&mut [&mut server, &mut first, &mut second], |e| {
        e[1].is_client_connected() && e[2].is_client_connected()
    })
    .await;
    assert!(ready);

    let mut third = start_client(port);
    let rejected = pump(&mut [&mut server, &mut third], |e| !e[1].is_client_active()).await;
    assert!(rejected);
    assert_eq!(
        third.drain_events().last(),
        Some(EngineEvent::ClientDisconnected {
            reason: DisconnectReason::Rejected
        })
    );

    assert_eq!(server.peers().len(), 2);
    assert!(first.is_client_connected());
    assert!(second.is_client_connected());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_state_flows_both_ways() {
    let (mut server, port) = start_server();
    let mut client = start_client(port);
    assert!(pump(&mut [&mut server, &mut client], |e| e[1].is_client_connected()).await);

    client.set_local_paddle(3.0);
    server.state_mut().set_ball_position(Vec2::new(1.5, -2.0));
    server.state_mut().increment_score(1);

    let synced = pump(&mut [&mut server, &mut client], |e| {
        e[0].state().paddle_position(0) == 3.0
            && e[1].state().paddle_position(0) == 3.0
            && e[1].state().ball_position() == Vec2::new(1.5, -2.0)
    })
    .await;
    assert!(synced);
    assert_eq!(client.state().scores(), [0, 1]);
    assert!(server.stats().packets_sent > 0);
    assert!(client.stats().packets_received > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_shutdown_reaches_client() {
    let (mut server, port) = start_server();
    let mut client = start_client(port);
    assert!(pump(&mut [&mut server, &mut client], |e| e[1].is_client_connected()).await);
    client.drain_events().for_each(drop);

    server.disable_server().unwrap();
    assert!(!server.is_server_active());

    let ended = pump(&mut [&mut client], |e| !e[0].is_client_active()).await;
    assert!(ended);
    assert_eq!(
        client.drain_events().collect::<Vec<_>>(),
        vec![EngineEvent::ClientDisconnected {
            reason: DisconnectReason::Graceful
        }]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_leave_frees_slot() {
    let (mut server, port) = start_server();
    let mut client = start_client(port);
    assert!(pump(&mut [&mut server, &mut client], |e| e[1].is_client_connected()).await);

    client.disable_client().unwrap();
    let freed = pump(&mut [&mut server], |e| e[0].peers().is_empty()).await;
    assert!(freed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_silent_server_times_out_client() {
    let (mut server, port) = start_server();
    let mut client = start_client(port);
    assert!(pump(&mut [&mut server, &mut client], |e| e[1].is_client_connected()).await);

    // Server stops ticking; drain whatever it already sent.
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.tick(FRAME);
    assert!(client.is_client_connected());

    client.tick(Duration::from_secs(11));
    assert!(!client.is_client_connected());
    assert_eq!(client.client_state(), ConnectionState::Disconnected);

    let left = pump(&mut [&mut server], |e| e[0].peers().is_empty()).await;
    assert!(left, "timed out client should say goodbye");
}
