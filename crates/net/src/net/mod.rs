mod connection;
mod protocol;
mod queue;
mod reader;
mod stats;
mod transport;

pub use connection::{ClientSession, ConnectionState, PeerSlot, SequenceFilter, SlotTable};
pub use protocol::{
    ClientUpdate, DEFAULT_PORT, DEFAULT_TICK_RATE, DEFAULT_TIMEOUT_SECS, MAX_PACKET_SIZE, Message,
    MessageTag, PLAYER_SLOTS, PROTOCOL_MAGIC, ServerUpdate, UpdateLayout, sequence_greater_than,
};
pub use queue::{PacketQueue, RawPacket};
pub use reader::{ByteReader, CodecError};
pub use stats::NetworkStats;
pub use transport::{Transport, TransportError, bind_socket, frame, probe_ports, strip_header};
