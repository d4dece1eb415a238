use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    PeerJoined {
        slot: usize,
        peer_id: u32,
        endpoint: SocketAddr,
    },
    PeerLeft {
        slot: usize,
        peer_id: u32,
        reason: DisconnectReason,
    },
    PeerRejected {
        endpoint: SocketAddr,
    },
    Connected {
        server: SocketAddr,
        client_id: u32,
    },
    ClientDisconnected {
        reason: DisconnectReason,
    },
    ServerStopped {
        reason: DisconnectReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The remote side sent DISCONNECT.
    Graceful,
    Timeout,
    Rejected,
    /// Disabled by the local caller.
    Local,
    TransportFailure,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Graceful => "disconnected",
            DisconnectReason::Timeout => "timed out",
            DisconnectReason::Rejected => "was rejected",
            DisconnectReason::Local => "was shut down locally",
            DisconnectReason::TransportFailure => "lost its socket",
        }
    }
}
