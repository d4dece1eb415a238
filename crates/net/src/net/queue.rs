use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use super::protocol::{Message, UpdateLayout};
use super::reader::{ByteReader, CodecError};

/// A received datagram with its magic header already stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    source: SocketAddr,
    payload: Vec<u8>,
    cursor: usize,
}

impl RawPacket {
    pub fn new(source: SocketAddr, payload: Vec<u8>) -> Self {
        Self {
            source,
            payload,
            cursor: 0,
        }
    }

    pub fn source(&self) -> SocketAddr {
        self.source
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Read offset into the payload.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.payload.len() - self.cursor
    }

    /// Decodes the next message and moves the cursor past every field it
    /// consumed, whether or not the caller ends up using them.
    pub fn decode_message(&mut self, layout: UpdateLayout) -> Result<Message, CodecError> {
        let mut reader = ByteReader::at(&self.payload, self.cursor);
        let result = Message::decode(&mut reader, layout);
        self.cursor = reader.position();
        result
    }
}

/// Unbounded FIFO shared between the receive task and the tick.
///
/// Cloning yields another handle to the same queue. The lock is only held
/// for a single enqueue or a whole-queue swap.
#[derive(Debug, Clone, Default)]
pub struct PacketQueue {
    inner: Arc<Mutex<VecDeque<RawPacket>>>,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, packet: RawPacket) {
        self.lock().push_back(packet);
    }

    pub fn store_batch<I>(&self, packets: I)
    where
        I: IntoIterator<Item = RawPacket>,
    {
        self.lock().extend(packets);
    }

    /// Takes everything queued so far, oldest first.
    pub fn drain_all(&self) -> Vec<RawPacket> {
        let drained = std::mem::take(&mut *self.lock());
        drained.into()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<RawPacket>> {
        // A panicking producer cannot leave a half-written packet behind.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;
    use crate::net::protocol::{ClientUpdate, ServerUpdate};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn packet(id: u32) -> RawPacket {
        RawPacket::new(addr(1000), id.to_le_bytes().to_vec())
    }

    fn id_of(packet: &RawPacket) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(packet.payload());
        u32::from_le_bytes(bytes)
    }

    #[test]
    fn test_drain_preserves_arrival_order() {
        let queue = PacketQueue::new();
        queue.store(packet(1));
        queue.store_batch([packet(2), packet(3)]);
        queue.store(packet(4));

        let ids: Vec<u32> = queue.drain_all().iter().map(id_of).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert!(queue.is_empty());
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn test_stores_after_drain_land_in_next_drain() {
        let queue = PacketQueue::new();
        for id in 0..10 {
            queue.store(packet(id));
        }

        let first = queue.drain_all();
        assert_eq!(first.len(), 10);

        let handles: Vec<_> = (0..4u32)
            .map(|producer| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        queue.store(packet(1000 + producer * 100 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let second = queue.drain_all();
        assert_eq!(second.len(), 100);
        let unique: HashSet<u32> = second.iter().map(id_of).collect();
        assert_eq!(unique.len(), 100);
    }

    #[test]
    fn test_concurrent_drain_never_loses_or_duplicates() {
        const PRODUCERS: u32 = 4;
        const PER_PRODUCER: u32 = 2000;

        let queue = PacketQueue::new();
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.store(packet(producer * PER_PRODUCER + i));
                    }
                })
            })
            .collect();

        let mut seen = Vec::new();
        while producers.iter().any(|p| !p.is_finished()) {
            seen.extend(queue.drain_all().iter().map(id_of));
        }
        for producer in producers {
            producer.join().unwrap();
        }
        seen.extend(queue.drain_all().iter().map(id_of));

        assert_eq!(seen.len(), (PRODUCERS * PER_PRODUCER) as usize);
        let unique: HashSet<u32> = seen.iter().copied().collect();
        assert_eq!(unique.len(), seen.len());

        // Per-producer order survives interleaving.
        for producer in 0..PRODUCERS {
            let range = producer * PER_PRODUCER..(producer + 1) * PER_PRODUCER;
            let ordered: Vec<u32> = seen.iter().copied().filter(|id| range.contains(id)).collect();
            assert!(ordered.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_decode_advances_cursor_over_full_update() {
        let update = Message::ClientUpdate(ClientUpdate {
            client_id: 1,
            sequence: 3,
            paddle_y: 0.0,
        });
        let mut packet = RawPacket::new(addr(2000), update.encode());
        packet.decode_message(UpdateLayout::FromClient).unwrap();
        assert_eq!(packet.cursor(), 1 + ClientUpdate::WIRE_SIZE);
        assert_eq!(packet.remaining(), 0);

        let mut truncated = RawPacket::new(addr(2000), vec![5, 0, 0]);
        assert!(truncated.decode_message(UpdateLayout::FromServer).is_err());
        assert!(truncated.cursor() < 1 + ServerUpdate::WIRE_SIZE);
    }
}
