pub mod engine;
pub mod net;
pub mod state;

pub use engine::{
    Admission, DisconnectReason, EngineConfig, EngineError, EngineEvent, PeerInfo, ProtocolEngine,
    ServerSession,
};
pub use net::{
    ClientUpdate, ConnectionState, DEFAULT_PORT, DEFAULT_TICK_RATE, Message, NetworkStats,
    PacketQueue, RawPacket, ServerUpdate, Transport, TransportError, UpdateLayout,
};
pub use state::{MatchState, PongState};
