use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::protocol::{MAX_PACKET_SIZE, PROTOCOL_MAGIC};
use super::queue::{PacketQueue, RawPacket};
use super::stats::{NetworkStats, TrafficCounters};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no free port between {start} and 65535")]
    PortsExhausted { start: u16 },
    #[error("socket failure: {0}")]
    SocketFailure(#[from] io::Error),
    #[error("transport is not listening")]
    NotListening,
}

/// Tries `bind` on `start_port` and every port above it until one is not
/// in use. Errors other than "address in use" end the search immediately.
pub fn probe_ports<S, F>(start_port: u16, mut bind: F) -> Result<(S, u16), TransportError>
where
    F: FnMut(u16) -> io::Result<S>,
{
    let mut port = start_port;
    loop {
        match bind(port) {
            Ok(socket) => return Ok((socket, port)),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                if port == u16::MAX {
                    log::error!("Every port from {} upwards is already taken", start_port);
                    return Err(TransportError::PortsExhausted { start: start_port });
                }
                log::warn!("Port {} is already taken, trying {}", port, port + 1);
                port += 1;
            }
            Err(e) => return Err(TransportError::SocketFailure(e)),
        }
    }
}

pub fn bind_socket(ip: IpAddr, start_port: u16) -> Result<std::net::UdpSocket, TransportError> {
    probe_ports(start_port, |port| {
        std::net::UdpSocket::bind(SocketAddr::new(ip, port))
    })
    .map(|(socket, _)| socket)
}

pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(PROTOCOL_MAGIC.len() + payload.len());
    datagram.extend_from_slice(&PROTOCOL_MAGIC);
    datagram.extend_from_slice(payload);
    datagram
}

pub fn strip_header(datagram: &[u8]) -> Option<&[u8]> {
    datagram.strip_prefix(&PROTOCOL_MAGIC[..])
}

/// One bound UDP socket plus the task that feeds its datagrams into a
/// [`PacketQueue`].
pub struct Transport {
    // Second handle on the same socket. Sends go through it directly so they
    // do not wait for the reactor to report the socket writable.
    sender: std::net::UdpSocket,
    local_addr: SocketAddr,
    listening: Arc<AtomicBool>,
    shutdown: CancellationToken,
    counters: Arc<TrafficCounters>,
    receive_task: JoinHandle<()>,
}

impl Transport {
    pub fn bind(
        ip: IpAddr,
        start_port: u16,
        queue: PacketQueue,
        runtime: &Handle,
    ) -> Result<Self, TransportError> {
        let std_socket = bind_socket(ip, start_port)?;
        std_socket.set_nonblocking(true)?;
        let local_addr = std_socket.local_addr()?;
        let sender = std_socket.try_clone()?;

        let socket = {
            let _guard = runtime.enter();
            UdpSocket::from_std(std_socket)?
        };

        let listening = Arc::new(AtomicBool::new(true));
        let shutdown = CancellationToken::new();
        let counters = Arc::new(TrafficCounters::default());

        let receive_task = runtime.spawn(receive_loop(ReceiveLoop {
            socket,
            queue,
            listening: Arc::clone(&listening),
            shutdown: shutdown.clone(),
            counters: Arc::clone(&counters),
        }));

        log::info!("Listening for datagrams on {}", local_addr);

        Ok(Self {
            sender,
            local_addr,
            listening,
            shutdown,
            counters,
            receive_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// False once closed or after the receive loop hit a fatal error.
    pub fn is_active(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    pub fn is_receiving(&self) -> bool {
        !self.receive_task.is_finished()
    }

    pub fn stats(&self) -> NetworkStats {
        self.counters.snapshot()
    }

    /// Prepends the magic header and hands one datagram to the OS.
    ///
    /// No acknowledgment, retry or ordering. A full send buffer drops the
    /// datagram and reports zero bytes.
    pub fn send(&self, payload: &[u8], to: SocketAddr) -> Result<usize, TransportError> {
        if !self.is_active() {
            return Err(TransportError::NotListening);
        }

        let datagram = frame(payload);
        match self.sender.send_to(&datagram, to) {
            Ok(bytes) => {
                self.counters.record_sent(bytes);
                log::trace!("Sent {} bytes to {}", bytes, to);
                Ok(bytes)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                log::warn!("Send buffer full, dropping datagram to {}", to);
                Ok(0)
            }
            Err(e) => Err(TransportError::SocketFailure(e)),
        }
    }

    pub fn close(&mut self) {
        self.shutdown.cancel();
        if self.listening.swap(false, Ordering::SeqCst) {
            log::info!("Transport on {} closed", self.local_addr);
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

struct ReceiveLoop {
    socket: UdpSocket,
    queue: PacketQueue,
    listening: Arc<AtomicBool>,
    shutdown: CancellationToken,
    counters: Arc<TrafficCounters>,
}

async fn receive_loop(ctx: ReceiveLoop) {
    // One spare byte makes an oversize datagram visible instead of silently
    // truncated.
    let mut buffer = vec![0u8; MAX_PACKET_SIZE + 1];

    loop {
        let received = tokio::select! {
            biased;
            // A receive racing the close is simply abandoned.
            _ = ctx.shutdown.cancelled() => break,
            result = ctx.socket.recv_from(&mut buffer) => result,
        };

        match received {
            Ok((size, addr)) if size > MAX_PACKET_SIZE => {
                ctx.counters.record_dropped();
                log::warn!("Dropping oversize datagram from {}", addr);
            }
            Ok((size, addr)) => {
                let Some(payload) = strip_header(&buffer[..size]) else {
                    ctx.counters.record_dropped();
                    log::warn!("Header mismatch in {} byte datagram from {}", size, addr);
                    continue;
                };

                ctx.counters.record_received(size);
                ctx.queue.store(RawPacket::new(addr, payload.to_vec()));
            }
            Err(e) if is_oversize(&e) => {
                ctx.counters.record_dropped();
                log::warn!("Dropping oversize datagram: {}", e);
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
                ) =>
            {
                log::debug!("Ignoring transient receive error: {}", e);
            }
            Err(e) => {
                log::error!("Receive failed, tearing down transport: {}", e);
                ctx.listening.store(false, Ordering::SeqCst);
                break;
            }
        }
    }
}

// Windows reports a datagram larger than the buffer as WSAEMSGSIZE rather
// than truncating it.
#[cfg(windows)]
fn is_oversize(e: &io::Error) -> bool {
    e.raw_os_error() == Some(10040)
}

#[cfg(not(windows))]
fn is_oversize(_: &io::Error) -> bool {
    false
}
