use std::net::{SocketAddr, ToSocketAddrs};

use crate::net::{ClientSession, ClientUpdate, ConnectionState, Message, ServerUpdate};
use crate::state::PongState;

use super::{DisconnectReason, EngineError, EngineEvent, ProtocolEngine, Role, send_message};

impl<S: PongState> ProtocolEngine<S> {
    /// Binds a socket and sends a REQUEST to `address:port`. The session
    /// stays in [`ConnectionState::Connecting`] until an ACCEPT arrives.
    pub fn enable_client(&mut self, address: &str, port: u16) -> Result<(), EngineError> {
        match self.role {
            Role::Client(_) => {
                log::warn!("Client is already enabled!");
                return Err(EngineError::AlreadyEnabled);
            }
            Role::Server(_) => {
                log::error!("Can't enable client while server is active!");
                return Err(EngineError::ServerAlreadyActive);
            }
            Role::Inactive => {}
        }

        let server = self.resolve(address, port)?;
        let transport = self.bind_transport(self.config.client_port)?;
        transport.send(&Message::Request.encode(), server)?;
        log::info!(
            "Client enabled on {}, connecting to {}",
            transport.local_addr(),
            server
        );

        self.transport = Some(transport);
        self.role = Role::Client(ClientSession::new(server));
        Ok(())
    }

    pub fn disable_client(&mut self) -> Result<(), EngineError> {
        if !self.is_client_active() {
            log::warn!("Client hasn't been enabled yet!");
            return Err(EngineError::ClientNotEnabled);
        }

        self.end_client_session(DisconnectReason::Local);
        Ok(())
    }

    fn resolve(&self, address: &str, port: u16) -> Result<SocketAddr, EngineError> {
        let invalid = || EngineError::InvalidAddress {
            address: format!("{}:{}", address, port),
        };

        let candidates: Vec<SocketAddr> = (address, port)
            .to_socket_addrs()
            .map_err(|e| {
                log::error!("Failed to resolve {}: {}", address, e);
                invalid()
            })?
            .collect();

        // The socket can only reach addresses of its own family.
        let wants_ipv4 = self.config.bind_address.is_ipv4();
        candidates
            .iter()
            .find(|candidate| candidate.is_ipv4() == wants_ipv4)
            .or_else(|| candidates.first())
            .copied()
            .ok_or_else(invalid)
    }

    pub(super) fn end_client_session(&mut self, reason: DisconnectReason) {
        let Role::Client(session) = std::mem::replace(&mut self.role, Role::Inactive) else {
            return;
        };

        let notify = matches!(reason, DisconnectReason::Local | DisconnectReason::Timeout);
        if notify && session.is_connected() {
            if let Some(server) = session.server_endpoint {
                send_message(
                    self.transport.as_ref(),
                    &Message::Disconnect {
                        peer_id: session.client_id,
                    },
                    server,
                );
            }
        }

        self.release_transport();
        self.events.push_back(EngineEvent::ClientDisconnected { reason });
        log::info!("Client disabled ({})", reason.as_str());
    }

    pub(super) fn accept_session(&mut self, source: SocketAddr, client_id: u32) {
        let Role::Client(session) = &mut self.role else {
            return;
        };

        if session.state != ConnectionState::Connecting {
            log::debug!("Ignoring repeated ACCEPT from {}", source);
            return;
        }

        session.connect(source, client_id);
        log::info!("Connected to {} as {}", source, client_id);
        self.events.push_back(EngineEvent::Connected {
            server: source,
            client_id,
        });
    }

    pub(super) fn server_closed_session(&mut self, source: SocketAddr) {
        let from_server =
            matches!(&self.role, Role::Client(session) if session.is_from_server(source));
        if !from_server {
            log::warn!("Ignoring DISCONNECT from unknown endpoint {}", source);
            return;
        }

        log::info!("Server closed the connection");
        self.end_client_session(DisconnectReason::Graceful);
    }

    pub(super) fn handle_server_update(&mut self, source: SocketAddr, update: ServerUpdate) {
        let Role::Client(session) = &mut self.role else {
            return;
        };

        if !session.is_connected() || !session.is_from_server(source) {
            log::debug!("Ignoring UPDATE from {}", source);
            return;
        }

        session.touch();
        if !session.server_sequence.accept(update.sequence) {
            log::trace!("Stale server update {}", update.sequence);
            return;
        }

        for (slot, y) in update.paddles.into_iter().enumerate() {
            self.state.set_paddle_position(slot, y);
        }
        self.state.set_scores(update.scores);
        self.state.set_ball_position(update.ball);
    }

    pub(super) fn send_client_update(&mut self) {
        let Role::Client(session) = &mut self.role else {
            return;
        };
        let (true, Some(server)) = (session.is_connected(), session.server_endpoint) else {
            return;
        };

        let update = Message::ClientUpdate(ClientUpdate {
            client_id: session.client_id,
            sequence: session.next_sequence(),
            paddle_y: self.local_paddle,
        });
        send_message(self.transport.as_ref(), &update, server);
    }
}
