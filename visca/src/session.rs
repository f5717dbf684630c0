//! VISCA-over-IP control sessions
//!
//! A session is the long-lived, connected UDP socket a camera library would
//! normally hold. Commands sent through it carry the 8-byte VISCA-over-IP
//! header (payload type, payload length, sequence number). The bare socket is
//! also exposed so the dispatcher can fall back to headerless datagrams on the
//! same source port.

use crate::{CameraEndpoint, ViscaError, ViscaResult};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

/// Payload type: VISCA command
pub const PAYLOAD_VISCA_COMMAND: u16 = 0x0100;
/// Payload type: VISCA inquiry
pub const PAYLOAD_VISCA_INQUIRY: u16 = 0x0110;
/// Payload type: VISCA reply
pub const PAYLOAD_VISCA_REPLY: u16 = 0x0111;
/// Payload type: control command (sequence reset)
pub const PAYLOAD_CONTROL_COMMAND: u16 = 0x0200;

/// Length of the VISCA-over-IP header
pub const HEADER_LEN: usize = 8;

const MAX_DATAGRAM: usize = 1500;

/// Upper bound on stale replies discarded before one inquiry
const MAX_DRAIN: usize = 4096;

/// Parsed VISCA-over-IP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub payload_type: u16,
    pub payload_len: u16,
    pub sequence: u32,
}

/// Wrap a payload in the VISCA-over-IP header
pub fn frame(payload_type: u16, sequence: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&payload_type.to_be_bytes());
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(&sequence.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Split a datagram into header and payload. The declared length must match.
pub fn parse_frame(datagram: &[u8]) -> Option<(FrameHeader, &[u8])> {
    if datagram.len() < HEADER_LEN {
        return None;
    }
    let header = FrameHeader {
        payload_type: u16::from_be_bytes([datagram[0], datagram[1]]),
        payload_len: u16::from_be_bytes([datagram[2], datagram[3]]),
        sequence: u32::from_be_bytes([datagram[4], datagram[5], datagram[6], datagram[7]]),
    };
    let payload = &datagram[HEADER_LEN..];
    if payload.len() != header.payload_len as usize {
        return None;
    }
    Some((header, payload))
}

/// What a session statically offers to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCapabilities {
    /// Framed command send is available
    pub command_send: bool,
    /// The underlying socket may be used directly
    pub raw_socket: bool,
}

impl Default for SessionCapabilities {
    fn default() -> Self {
        Self {
            command_send: true,
            raw_socket: true,
        }
    }
}

/// A connected control session to one camera
#[async_trait]
pub trait ControlSession: Send + Sync {
    /// Capabilities offered to the dispatcher
    fn capabilities(&self) -> SessionCapabilities;

    /// Send a command through the session's own protocol
    async fn send_command(&self, payload: &[u8]) -> ViscaResult<()>;

    /// Send an inquiry and wait for its completion payload
    async fn inquire(&self, payload: &[u8], wait: Duration) -> ViscaResult<Vec<u8>>;

    /// The lower-level socket, when the session exposes one
    fn raw_socket(&self) -> Option<&UdpSocket> {
        None
    }
}

/// UDP session speaking VISCA-over-IP
pub struct ViscaSession {
    socket: UdpSocket,
    peer: SocketAddr,
    sequence: AtomicU32,
    capabilities: SessionCapabilities,
    // One inquiry in flight at a time so replies are not stolen
    inquiry_lock: Mutex<()>,
}

impl ViscaSession {
    /// Bind an ephemeral local port and connect it to the endpoint
    pub async fn open(endpoint: &CameraEndpoint) -> ViscaResult<Self> {
        Self::open_with(endpoint, SessionCapabilities::default()).await
    }

    /// Open with explicit capabilities
    pub async fn open_with(
        endpoint: &CameraEndpoint,
        capabilities: SessionCapabilities,
    ) -> ViscaResult<Self> {
        let peer = endpoint.resolve().await?;
        let local: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        debug!("Opened VISCA session to {} from {:?}", peer, socket.local_addr().ok());

        Ok(Self {
            socket,
            peer,
            sequence: AtomicU32::new(0),
            capabilities,
            inquiry_lock: Mutex::new(()),
        })
    }

    /// Camera address this session talks to
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn next_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// Ask the camera to reset its expected sequence number
    pub async fn reset_sequence(&self) -> ViscaResult<()> {
        self.sequence.store(0, Ordering::SeqCst);
        let datagram = frame(PAYLOAD_CONTROL_COMMAND, 0, &[0x01]);
        self.socket.send(&datagram).await?;
        Ok(())
    }

    /// Discard replies already queued on the socket; returns how many went.
    ///
    /// Cameras ACK and complete every command and nothing else reads those,
    /// so they pile up between inquiries.
    fn drain_pending(&self) -> usize {
        let mut buf = [0u8; MAX_DATAGRAM];
        let mut drained = 0;
        while drained < MAX_DRAIN {
            match self.socket.try_recv(&mut buf) {
                Ok(_) => drained += 1,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                // A queued ICMP error; keep draining
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => drained += 1,
                Err(e) => {
                    debug!("Stopped draining {}: {}", self.peer, e);
                    break;
                }
            }
        }
        if drained > 0 {
            debug!("Discarded {} stale datagrams from {}", drained, self.peer);
        }
        drained
    }

    async fn send_framed(&self, payload_type: u16, payload: &[u8]) -> ViscaResult<u32> {
        let sequence = self.next_sequence();
        self.socket.send(&frame(payload_type, sequence, payload)).await?;
        Ok(sequence)
    }
}

#[async_trait]
impl ControlSession for ViscaSession {
    fn capabilities(&self) -> SessionCapabilities {
        self.capabilities
    }

    async fn send_command(&self, payload: &[u8]) -> ViscaResult<()> {
        if !self.capabilities.command_send {
            return Err(ViscaError::UnsupportedCapability("session command send".into()));
        }
        self.send_framed(PAYLOAD_VISCA_COMMAND, payload).await?;
        Ok(())
    }

    async fn inquire(&self, payload: &[u8], wait: Duration) -> ViscaResult<Vec<u8>> {
        let _guard = self.inquiry_lock.lock().await;
        self.drain_pending();
        let framed = self.capabilities.command_send;

        let sequence = if framed {
            Some(self.send_framed(PAYLOAD_VISCA_INQUIRY, payload).await?)
        } else {
            self.socket.send(payload).await?;
            None
        };

        let deadline = tokio::time::Instant::now() + wait;
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(ViscaError::timeout("inquiry", wait));
            }
            let len = match timeout(remaining, self.socket.recv(&mut buf)).await {
                Ok(result) => result?,
                Err(_) => return Err(ViscaError::timeout("inquiry", wait)),
            };

            let body = match sequence {
                Some(expected) => match parse_frame(&buf[..len]) {
                    Some((header, body))
                        if header.payload_type == PAYLOAD_VISCA_REPLY
                            && header.sequence == expected =>
                    {
                        body
                    }
                    _ => {
                        debug!("Ignoring unrelated datagram from {}", self.peer);
                        continue;
                    }
                },
                None => &buf[..len],
            };

            match body.get(1).map(|b| b & 0xF0) {
                // ACK; completion follows
                Some(0x40) => continue,
                Some(0x50) => return Ok(body.to_vec()),
                Some(0x60) => {
                    return Err(ViscaError::MalformedReply(format!(
                        "camera returned error {:02X?}",
                        body
                    )))
                }
                _ => continue,
            }
        }
    }

    fn raw_socket(&self) -> Option<&UdpSocket> {
        if self.capabilities.raw_socket {
            Some(&self.socket)
        } else {
            None
        }
    }
}
