use std::net::SocketAddr;
use std::time::Duration;

use super::protocol::{PLAYER_SLOTS, sequence_greater_than};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Last sequence number accepted from one sender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceFilter {
    last_seen: Option<u16>,
}

impl SequenceFilter {
    /// Records `sequence` and returns true if it is newer than anything
    /// seen so far. The first sequence after a reset is always accepted.
    pub fn accept(&mut self, sequence: u16) -> bool {
        let fresh = self
            .last_seen
            .is_none_or(|last| sequence_greater_than(sequence, last));
        if fresh {
            self.last_seen = Some(sequence);
        }
        fresh
    }

    pub fn last_seen(&self) -> Option<u16> {
        self.last_seen
    }

    pub fn reset(&mut self) {
        self.last_seen = None;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeerSlot {
    pub endpoint: SocketAddr,
    pub peer_id: u32,
    pub sequence: SequenceFilter,
    pub since_last_message: Duration,
}

impl PeerSlot {
    pub fn new(endpoint: SocketAddr, peer_id: u32) -> Self {
        Self {
            endpoint,
            peer_id,
            sequence: SequenceFilter::default(),
            since_last_message: Duration::ZERO,
        }
    }

    pub fn touch(&mut self) {
        self.since_last_message = Duration::ZERO;
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.since_last_message > timeout
    }
}

/// Fixed-capacity table of server-side peer slots.
#[derive(Debug, Clone)]
pub struct SlotTable<const N: usize = PLAYER_SLOTS> {
    slots: [Option<PeerSlot>; N],
}

impl<const N: usize> Default for SlotTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SlotTable<N> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn first_empty(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn is_full(&self) -> bool {
        self.first_empty().is_none()
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn find_by_id(&self, peer_id: u32) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|s| s.peer_id == peer_id))
    }

    pub fn find_by_endpoint(&self, endpoint: SocketAddr) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|s| s.endpoint == endpoint))
    }

    pub fn contains_id(&self, peer_id: u32) -> bool {
        self.find_by_id(peer_id).is_some()
    }

    pub fn get(&self, index: usize) -> Option<&PeerSlot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut PeerSlot> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Places `slot` into the first empty entry and returns its index.
    pub fn occupy(&mut self, slot: PeerSlot) -> Option<usize> {
        let index = self.first_empty()?;
        self.slots[index] = Some(slot);
        Some(index)
    }

    pub fn clear(&mut self, index: usize) -> Option<PeerSlot> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    pub fn clear_all(&mut self) -> Vec<(usize, PeerSlot)> {
        (0..N)
            .filter_map(|index| self.clear(index).map(|slot| (index, slot)))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &PeerSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|s| (index, s)))
    }

    /// Adds `elapsed` to every occupied slot's timer and removes the ones
    /// that went past `timeout`.
    pub fn advance_timers(&mut self, elapsed: Duration, timeout: Duration) -> Vec<(usize, PeerSlot)> {
        let mut timed_out = Vec::new();
        for (index, entry) in self.slots.iter_mut().enumerate() {
            let Some(slot) = entry.as_mut() else {
                continue;
            };
            slot.since_last_message += elapsed;
            if slot.is_timed_out(timeout) {
                if let Some(slot) = entry.take() {
                    timed_out.push((index, slot));
                }
            }
        }
        timed_out
    }
}

/// Client-side view of the link to the server.
#[derive(Debug, Clone)]
pub struct ClientSession {
    pub state: ConnectionState,
    /// Where the REQUEST was sent.
    pub requested_endpoint: SocketAddr,
    /// Set from the source of the ACCEPT.
    pub server_endpoint: Option<SocketAddr>,
    pub client_id: u32,
    pub server_sequence: SequenceFilter,
    pub local_sequence: u16,
    pub since_last_server_message: Duration,
}

impl ClientSession {
    pub fn new(requested_endpoint: SocketAddr) -> Self {
        Self {
            state: ConnectionState::Connecting,
            requested_endpoint,
            server_endpoint: None,
            client_id: 0,
            server_sequence: SequenceFilter::default(),
            local_sequence: 0,
            since_last_server_message: Duration::ZERO,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_from_server(&self, endpoint: SocketAddr) -> bool {
        self.server_endpoint == Some(endpoint)
    }

    pub fn connect(&mut self, server_endpoint: SocketAddr, client_id: u32) {
        self.state = ConnectionState::Connected;
        self.server_endpoint = Some(server_endpoint);
        self.client_id = client_id;
        self.server_sequence.reset();
        self.since_last_server_message = Duration::ZERO;
    }

    pub fn next_sequence(&mut self) -> u16 {
        self.local_sequence = self.local_sequence.wrapping_add(1);
        self.local_sequence
    }

    pub fn touch(&mut self) {
        self.since_last_server_message = Duration::ZERO;
    }
}
