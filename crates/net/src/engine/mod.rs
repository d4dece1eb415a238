mod client;
mod config;
mod events;
mod server;


use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::net::{
    ClientSession, ConnectionState, Message, NetworkStats, PacketQueue, RawPacket, Transport,
    TransportError, UpdateLayout,
};
use crate::state::{MatchState, PongState};

pub use config::EngineConfig;
pub use events::{DisconnectReason, EngineEvent};
pub use server::{Admission, ServerSession};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("role is already enabled")]
    AlreadyEnabled,
    #[error("can't enable the client while the server is active")]
    ServerAlreadyActive,
    #[error("can't enable the server while the client is active")]
    ClientAlreadyActive,
    #[error("client hasn't been enabled")]
    ClientNotEnabled,
    #[error("server hasn't been enabled")]
    ServerNotEnabled,
    #[error("could not resolve address {address}")]
    InvalidAddress { address: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeerInfo {
    pub slot: usize,
    pub peer_id: u32,
    pub endpoint: SocketAddr,
    pub since_last_message: Duration,
}

#[derive(Debug)]
enum Role {
    Inactive,
    Client(ClientSession),
    Server(ServerSession),
}

/// Connection state machine for one node, either client or server.
///
/// All mutation happens in [`ProtocolEngine::tick`] and the enable/disable
/// calls, which must come from a single context. The only state shared with
/// the socket's receive task is the packet queue.
pub struct ProtocolEngine<S: PongState = MatchState> {
    config: EngineConfig,
    runtime: Handle,
    queue: PacketQueue,
    transport: Option<Transport>,
    role: Role,
    state: S,
    local_paddle: f32,
    events: VecDeque<EngineEvent>,
}

impl ProtocolEngine<MatchState> {
    pub fn new(config: EngineConfig, runtime: Handle) -> Self {
        Self::with_state(config, runtime, MatchState::default())
    }
}

impl<S: PongState> ProtocolEngine<S> {
    pub fn with_state(config: EngineConfig, runtime: Handle, state: S) -> Self {
        Self {
            config,
            runtime,
            queue: PacketQueue::new(),
            transport: None,
            role: Role::Inactive,
            state,
            local_paddle: 0.0,
            events: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Inbound queue fed by the transport.
    pub fn queue(&self) -> &PacketQueue {
        &self.queue
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.as_ref().map(Transport::local_addr)
    }

    pub fn stats(&self) -> NetworkStats {
        self.transport
            .as_ref()
            .map(Transport::stats)
            .unwrap_or_default()
    }

    pub fn set_local_paddle(&mut self, y: f32) {
        self.local_paddle = y;
    }

    pub fn local_paddle(&self) -> f32 {
        self.local_paddle
    }

    pub fn is_client_active(&self) -> bool {
        matches!(self.role, Role::Client(_))
    }

    pub fn is_client_connected(&self) -> bool {
        matches!(&self.role, Role::Client(session) if session.is_connected())
    }

    pub fn client_state(&self) -> ConnectionState {
        match &self.role {
            Role::Client(session) => session.state,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn client_id(&self) -> Option<u32> {
        match &self.role {
            Role::Client(session) if session.is_connected() => Some(session.client_id),
            _ => None,
        }
    }

    pub fn is_server_active(&self) -> bool {
        matches!(self.role, Role::Server(_))
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        let Role::Server(server) = &self.role else {
            return Vec::new();
        };
        server
            .slots()
            .iter()
            .map(|(slot, peer)| PeerInfo {
                slot,
                peer_id: peer.peer_id,
                endpoint: peer.endpoint,
                since_last_message: peer.since_last_message,
            })
            .collect()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = EngineEvent> + '_ {
        self.events.drain(..)
    }

    /// Runs one protocol step: dispatch everything queued since the last
    /// tick, expire silent peers, then send this tick's UPDATE.
    pub fn tick(&mut self, elapsed: Duration) {
        if self.reap_failed_transport() {
            return;
        }

        let packets = self.queue.drain_all();
        if matches!(self.role, Role::Inactive) {
            if !packets.is_empty() {
                log::debug!("Dropping {} packets while no role is active", packets.len());
            }
            return;
        }

        for packet in packets {
            self.process_packet(packet);
        }

        self.sweep_timeouts(elapsed);
        self.broadcast_update();
    }

    fn process_packet(&mut self, mut packet: RawPacket) {
        let layout = match self.role {
            Role::Server(_) => UpdateLayout::FromClient,
            _ => UpdateLayout::FromServer,
        };
        let source = packet.source();

        let message = match packet.decode_message(layout) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Dropping packet from {}: {}", source, e);
                return;
            }
        };

        if packet.remaining() > 0 {
            log::debug!(
                "Ignoring {} trailing bytes after {:?} from {}",
                packet.remaining(),
                message,
                source
            );
        }

        match message {
            Message::Request => self.handle_request(source),
            Message::Accept { client_id } => self.handle_accept(source, client_id),
            Message::Reject => self.handle_reject(source),
            Message::Disconnect { peer_id } => self.handle_disconnect(source, peer_id),
            Message::ClientUpdate(update) => self.handle_client_update(source, update),
            Message::ServerUpdate(update) => self.handle_server_update(source, update),
            Message::Heartbeat { peer_id } => self.handle_heartbeat(source, peer_id),
            Message::Unknown(tag) => {
                log::warn!("Unknown message type {} from {}", tag, source);
            }
        }
    }

    fn handle_request(&mut self, source: SocketAddr) {
        match self.role {
            Role::Server(_) => self.admit_peer(source),
            Role::Client(_) => {
                log::debug!("Clients don't accept connections, rejecting {}", source);
                send_message(self.transport.as_ref(), &Message::Reject, source);
            }
            Role::Inactive => {}
        }
    }

    fn handle_accept(&mut self, source: SocketAddr, client_id: u32) {
        match self.role {
            Role::Client(_) => self.accept_session(source, client_id),
            _ => log::warn!("Unexpected ACCEPT from {}", source),
        }
    }

    fn handle_reject(&mut self, source: SocketAddr) {
        match self.role {
            Role::Client(_) => {
                log::info!("Connection rejected by {}", source);
                self.end_client_session(DisconnectReason::Rejected);
            }
            _ => log::warn!("Unexpected REJECT from {}", source),
        }
    }

    fn handle_disconnect(&mut self, source: SocketAddr, peer_id: u32) {
        match self.role {
            Role::Client(_) => self.server_closed_session(source),
            Role::Server(_) => self.release_peer(source, peer_id),
            Role::Inactive => {}
        }
    }

    fn handle_heartbeat(&mut self, source: SocketAddr, peer_id: u32) {
        match &mut self.role {
            Role::Client(session) => {
                if session.is_from_server(source) {
                    session.touch();
                }
            }
            Role::Server(server) => {
                if let Some(slot) = server.slot_for_id_mut(peer_id) {
                    slot.touch();
                } else {
                    log::debug!("Heartbeat for unknown peer {} from {}", peer_id, source);
                }
            }
            Role::Inactive => {}
        }
    }

    fn sweep_timeouts(&mut self, elapsed: Duration) {
        if matches!(self.role, Role::Server(_)) {
            self.expire_peers(elapsed);
            return;
        }

        let timeout = self.config.timeout;
        let Role::Client(session) = &mut self.role else {
            return;
        };
        session.since_last_server_message += elapsed;
        if session.since_last_server_message <= timeout {
            return;
        }

        match session.state {
            ConnectionState::Connected => log::info!("Connection timed out. Disconnecting..."),
            _ => log::info!("No response from {}", session.requested_endpoint),
        }
        self.end_client_session(DisconnectReason::Timeout);
    }

    fn broadcast_update(&mut self) {
        match self.role {
            Role::Client(_) => self.send_client_update(),
            Role::Server(_) => self.send_server_update(),
            Role::Inactive => {}
        }
    }

    /// Tears the active role down if the receive loop died since the last
    /// tick. The caller has to enable a role again.
    fn reap_failed_transport(&mut self) -> bool {
        let failed = self.transport.as_ref().is_some_and(|t| !t.is_active());
        if !failed {
            return false;
        }

        self.release_transport();
        match std::mem::replace(&mut self.role, Role::Inactive) {
            Role::Client(_) => {
                log::error!("Socket failed, client disabled");
                self.events.push_back(EngineEvent::ClientDisconnected {
                    reason: DisconnectReason::TransportFailure,
                });
            }
            Role::Server(_) => {
                log::error!("Socket failed, server disabled");
                self.events.push_back(EngineEvent::ServerStopped {
                    reason: DisconnectReason::TransportFailure,
                });
            }
            Role::Inactive => {}
        }
        true
    }

    fn bind_transport(&mut self, port: u16) -> Result<Transport, EngineError> {
        self.queue.clear();
        let transport = Transport::bind(
            self.config.bind_address,
            port,
            self.queue.clone(),
            &self.runtime,
        )?;
        Ok(transport)
    }

    fn release_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.queue.clear();
    }
}

impl<S: PongState> Drop for ProtocolEngine<S> {
    fn drop(&mut self) {
        match self.role {
            Role::Client(_) => {
                let _ = self.disable_client();
            }
            Role::Server(_) => {
                let _ = self.disable_server();
            }
            Role::Inactive => {}
        }
    }
}

pub(crate) fn send_message(transport: Option<&Transport>, message: &Message, to: SocketAddr) {
    send_payload(transport, &message.encode(), to);
}

/// Fire-and-forget send; failures are logged, never surfaced to the tick.
pub(crate) fn send_payload(transport: Option<&Transport>, payload: &[u8], to: SocketAddr) {
    let Some(transport) = transport else {
        log::warn!("Tried to send to {}, but no socket is bound", to);
        return;
    };
    if let Err(e) = transport.send(payload, to) {
        log::warn!("Failed to send to {}: {}", to, e);
    }
}
