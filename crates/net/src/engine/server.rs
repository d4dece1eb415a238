use std::net::SocketAddr;
use std::time::Duration;

use crate::net::{ClientUpdate, Message, PeerSlot, ServerUpdate, SlotTable};
use crate::state::PongState;

use super::{
    DisconnectReason, EngineError, EngineEvent, ProtocolEngine, Role, send_message, send_payload,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted { slot: usize, peer_id: u32 },
    /// The endpoint already holds a slot; its id is handed out again.
    AlreadyConnected { slot: usize, peer_id: u32 },
    Full,
}

/// Server-side role state, created on enable and dropped on disable.
#[derive(Debug, Default)]
pub struct ServerSession {
    slots: SlotTable,
    send_sequence: u16,
}

impl ServerSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    pub fn admit(&mut self, endpoint: SocketAddr) -> Admission {
        if let Some(slot) = self.slots.find_by_endpoint(endpoint) {
            let peer_id = self.slots.get(slot).map_or(0, |s| s.peer_id);
            return Admission::AlreadyConnected { slot, peer_id };
        }

        if self.slots.is_full() {
            return Admission::Full;
        }

        let peer_id = self.generate_peer_id();
        match self.slots.occupy(PeerSlot::new(endpoint, peer_id)) {
            Some(slot) => Admission::Accepted { slot, peer_id },
            None => Admission::Full,
        }
    }

    pub fn slot_for_id_mut(&mut self, peer_id: u32) -> Option<&mut PeerSlot> {
        let index = self.slots.find_by_id(peer_id)?;
        self.slots.get_mut(index)
    }

    pub fn release(&mut self, peer_id: u32) -> Option<(usize, PeerSlot)> {
        let index = self.slots.find_by_id(peer_id)?;
        self.slots.clear(index).map(|slot| (index, slot))
    }

    pub fn next_sequence(&mut self) -> u16 {
        self.send_sequence = self.send_sequence.wrapping_add(1);
        self.send_sequence
    }

    // Zero marks "no peer" in the wire protocol and must never be assigned.
    fn generate_peer_id(&self) -> u32 {
        loop {
            let id = rand::random::<u32>();
            if id != 0 && !self.slots.contains_id(id) {
                return id;
            }
        }
    }
}

impl<S: PongState> ProtocolEngine<S> {
    pub fn enable_server(&mut self, port: u16) -> Result<(), EngineError> {
        match self.role {
            Role::Server(_) => {
                log::warn!("Server is already enabled!");
                return Err(EngineError::AlreadyEnabled);
            }
            Role::Client(_) => {
                log::error!("Can't enable server while client is active!");
                return Err(EngineError::ClientAlreadyActive);
            }
            Role::Inactive => {}
        }

        let transport = self.bind_transport(port)?;
        log::info!("Server enabled on {}", transport.local_addr());

        self.transport = Some(transport);
        self.role = Role::Server(ServerSession::new());
        Ok(())
    }

    /// Notifies every connected peer and releases the socket.
    pub fn disable_server(&mut self) -> Result<(), EngineError> {
        if !self.is_server_active() {
            log::warn!("Server hasn't been enabled yet!");
            return Err(EngineError::ServerNotEnabled);
        }

        if let Role::Server(mut server) = std::mem::replace(&mut self.role, Role::Inactive) {
            for (slot, peer) in server.slots.clear_all() {
                send_message(
                    self.transport.as_ref(),
                    &Message::Disconnect {
                        peer_id: peer.peer_id,
                    },
                    peer.endpoint,
                );
                self.events.push_back(EngineEvent::PeerLeft {
                    slot,
                    peer_id: peer.peer_id,
                    reason: DisconnectReason::Local,
                });
            }
        }

        self.release_transport();
        self.events.push_back(EngineEvent::ServerStopped {
            reason: DisconnectReason::Local,
        });
        log::info!("Server disabled successfully.");
        Ok(())
    }

    pub(super) fn admit_peer(&mut self, source: SocketAddr) {
        let Role::Server(server) = &mut self.role else {
            return;
        };

        let reply = match server.admit(source) {
            Admission::Accepted { slot, peer_id } => {
                log::info!("Player {} connected. ({})", slot + 1, source);
                self.events.push_back(EngineEvent::PeerJoined {
                    slot,
                    peer_id,
                    endpoint: source,
                });
                Message::Accept { client_id: peer_id }
            }
            Admission::AlreadyConnected { slot, peer_id } => {
                log::debug!("Repeated request from player {} ({})", slot + 1, source);
                Message::Accept { client_id: peer_id }
            }
            Admission::Full => {
                log::warn!("Both slots are taken, rejecting {}", source);
                self.events.push_back(EngineEvent::PeerRejected { endpoint: source });
                Message::Reject
            }
        };

        send_message(self.transport.as_ref(), &reply, source);
    }

    pub(super) fn release_peer(&mut self, source: SocketAddr, peer_id: u32) {
        let Role::Server(server) = &mut self.role else {
            return;
        };

        match server.release(peer_id) {
            Some((slot, _)) => {
                log::info!("Player {} disconnected. ({})", slot + 1, source);
                self.events.push_back(EngineEvent::PeerLeft {
                    slot,
                    peer_id,
                    reason: DisconnectReason::Graceful,
                });
            }
            None => log::debug!("Disconnect for unknown peer {} from {}", peer_id, source),
        }
    }

    pub(super) fn handle_client_update(&mut self, source: SocketAddr, update: ClientUpdate) {
        let Role::Server(server) = &mut self.role else {
            return;
        };

        let Some(index) = server.slots.find_by_id(update.client_id) else {
            log::debug!("Update for unknown peer {} from {}", update.client_id, source);
            return;
        };
        let Some(slot) = server.slots.get_mut(index) else {
            return;
        };

        // Any update proves the peer is alive, even one that arrives late.
        slot.touch();
        if slot.sequence.accept(update.sequence) {
            self.state.set_paddle_position(index, update.paddle_y);
        } else {
            log::trace!(
                "Stale update {} from player {}",
                update.sequence,
                index + 1
            );
        }
    }

    pub(super) fn expire_peers(&mut self, elapsed: Duration) {
        let timeout = self.config.timeout;
        let Role::Server(server) = &mut self.role else {
            return;
        };

        for (slot, peer) in server.slots.advance_timers(elapsed, timeout) {
            log::info!("Player {} timed out.", slot + 1);
            send_message(
                self.transport.as_ref(),
                &Message::Disconnect {
                    peer_id: peer.peer_id,
                },
                peer.endpoint,
            );
            self.events.push_back(EngineEvent::PeerLeft {
                slot,
                peer_id: peer.peer_id,
                reason: DisconnectReason::Timeout,
            });
        }
    }

    pub(super) fn send_server_update(&mut self) {
        let Role::Server(server) = &mut self.role else {
            return;
        };
        if server.slots.occupied_count() == 0 {
            return;
        }

        let update = Message::ServerUpdate(ServerUpdate {
            sequence: server.next_sequence(),
            paddles: self.state.paddle_positions(),
            scores: self.state.scores(),
            ball: self.state.ball_position(),
        });
        let payload = update.encode();

        for (_, peer) in server.slots.iter() {
            send_payload(self.transport.as_ref(), &payload, peer.endpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 168, 0, 2], port))
    }

    #[test]
    fn test_admit_fills_slots_in_order() {
        let mut server = ServerSession::new();

        let Admission::Accepted { slot: 0, peer_id: a } = server.admit(addr(1)) else {
            panic!("first peer should take slot 0");
        };
        let Admission::Accepted { slot: 1, peer_id: b } = server.admit(addr(2)) else {
            panic!("second peer should take slot 1");
        };

        assert_ne!(a, 0);
        assert_ne!(b, 0);
        assert_ne!(a, b);
        assert_eq!(server.admit(addr(3)), Admission::Full);
        assert_eq!(server.slots().get(0).unwrap().endpoint, addr(1));
        assert_eq!(server.slots().get(1).unwrap().endpoint, addr(2));
    }

    #[test]
    fn test_repeated_request_keeps_slot() {
        let mut server = ServerSession::new();
        let Admission::Accepted { peer_id, .. } = server.admit(addr(1)) else {
            panic!("expected accept");
        };

        assert_eq!(
            server.admit(addr(1)),
            Admission::AlreadyConnected { slot: 0, peer_id }
        );
        assert_eq!(server.slots().occupied_count(), 1);
    }

    #[test]
    fn test_release_frees_slot_for_next_peer() {
        let mut server = ServerSession::new();
        let Admission::Accepted { peer_id, .. } = server.admit(addr(1)) else {
            panic!("expected accept");
        };
        server.admit(addr(2));

        let (slot, released) = server.release(peer_id).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(released.endpoint, addr(1));
        assert!(server.release(peer_id).is_none());
        assert!(matches!(
            server.admit(addr(3)),
            Admission::Accepted { slot: 0, .. }
        ));
    }

    #[test]
    fn test_sequence_counter_increments() {
        let mut server = ServerSession::new();
        assert_eq!(server.next_sequence(), 1);
        assert_eq!(server.next_sequence(), 2);
    }
}
