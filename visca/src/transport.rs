//! Command delivery
//!
//! Cameras differ in what they accept, so an encoded payload is offered to a
//! fixed, ordered list of strategies until one of them succeeds:
//!
//! 1. the camera's control session, if it can send framed commands
//! 2. a fresh TCP connection (connect, send, close)
//! 3. a fresh UDP datagram carrying the bare payload
//! 4. the session's own UDP socket, bare payload
//!
//! Each strategy states up front whether it applies to a target. Inapplicable
//! strategies are skipped, every other attempt is bounded by a timeout.

use crate::session::ControlSession;
use crate::{CameraEndpoint, ViscaError, ViscaResult};
use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Timeouts applied to delivery attempts and inquiries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Timeout for a single send
    pub send_timeout: Duration,
    /// How long to wait for an inquiry reply
    pub inquiry_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(300),
            send_timeout: Duration::from_millis(300),
            inquiry_timeout: Duration::from_millis(500),
        }
    }
}

impl TransportConfig {
    /// Short timeouts for loopback tests
    pub fn quick() -> Self {
        Self {
            connect_timeout: Duration::from_millis(100),
            send_timeout: Duration::from_millis(100),
            inquiry_timeout: Duration::from_millis(150),
        }
    }

    /// Upper bound for one strategy attempt
    pub fn attempt_timeout(&self) -> Duration {
        self.connect_timeout + self.send_timeout
    }
}

/// Identifies a delivery strategy in logs and results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Session,
    Stream,
    Datagram,
    RawHandle,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Session => "session",
            StrategyKind::Stream => "tcp stream",
            StrategyKind::Datagram => "udp datagram",
            StrategyKind::RawHandle => "raw socket",
        };
        f.write_str(name)
    }
}

/// Where a payload is going
#[derive(Clone, Copy)]
pub struct DeliveryTarget<'a> {
    pub endpoint: &'a CameraEndpoint,
    pub session: Option<&'a dyn ControlSession>,
}

impl<'a> DeliveryTarget<'a> {
    pub fn new(endpoint: &'a CameraEndpoint, session: Option<&'a dyn ControlSession>) -> Self {
        Self { endpoint, session }
    }

    /// Target without a control session
    pub fn bare(endpoint: &'a CameraEndpoint) -> Self {
        Self {
            endpoint,
            session: None,
        }
    }
}

/// One way of getting bytes to a camera
#[async_trait]
pub trait TransportStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Whether this strategy can be attempted for the target at all
    fn is_applicable(&self, target: &DeliveryTarget<'_>) -> bool;

    async fn send(&self, target: &DeliveryTarget<'_>, payload: &[u8]) -> ViscaResult<()>;
}

/// Framed send through the camera's control session
pub struct SessionStrategy;

#[async_trait]
impl TransportStrategy for SessionStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Session
    }

    fn is_applicable(&self, target: &DeliveryTarget<'_>) -> bool {
        target
            .session
            .map(|s| s.capabilities().command_send)
            .unwrap_or(false)
    }

    async fn send(&self, target: &DeliveryTarget<'_>, payload: &[u8]) -> ViscaResult<()> {
        let session = target
            .session
            .ok_or_else(|| ViscaError::UnsupportedCapability("control session".into()))?;
        session.send_command(payload).await
    }
}

/// Fresh TCP connection per command
pub struct StreamStrategy {
    connect_timeout: Duration,
    send_timeout: Duration,
}

impl StreamStrategy {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            send_timeout: config.send_timeout,
        }
    }
}

#[async_trait]
impl TransportStrategy for StreamStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Stream
    }

    fn is_applicable(&self, _target: &DeliveryTarget<'_>) -> bool {
        true
    }

    async fn send(&self, target: &DeliveryTarget<'_>, payload: &[u8]) -> ViscaResult<()> {
        let addr = target.endpoint.resolve().await?;
        let mut stream = match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ViscaError::connection_refused(addr.to_string(), e)),
            Err(_) => return Err(ViscaError::timeout("tcp connect", self.connect_timeout)),
        };

        match timeout(self.send_timeout, stream.write_all(payload)).await {
            Ok(result) => result?,
            Err(_) => return Err(ViscaError::timeout("tcp send", self.send_timeout)),
        }
        // Close errors do not undo a completed write
        let _ = stream.shutdown().await;
        Ok(())
    }
}

/// Fresh UDP socket per command, no VISCA-over-IP header
pub struct DatagramStrategy {
    send_timeout: Duration,
}

impl DatagramStrategy {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            send_timeout: config.send_timeout,
        }
    }
}

fn unspecified_for(addr: &SocketAddr) -> SocketAddr {
    if addr.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
    }
}

#[async_trait]
impl TransportStrategy for DatagramStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Datagram
    }

    fn is_applicable(&self, _target: &DeliveryTarget<'_>) -> bool {
        true
    }

    async fn send(&self, target: &DeliveryTarget<'_>, payload: &[u8]) -> ViscaResult<()> {
        let addr = target.endpoint.resolve().await?;
        let socket = UdpSocket::bind(unspecified_for(&addr)).await?;
        match timeout(self.send_timeout, socket.send_to(payload, addr)).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(ViscaError::timeout("udp send", self.send_timeout)),
        }
    }
}

/// Bare payload over the session's connected socket
pub struct RawHandleStrategy {
    send_timeout: Duration,
}

impl RawHandleStrategy {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            send_timeout: config.send_timeout,
        }
    }
}

#[async_trait]
impl TransportStrategy for RawHandleStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RawHandle
    }

    fn is_applicable(&self, target: &DeliveryTarget<'_>) -> bool {
        target
            .session
            .map(|s| s.capabilities().raw_socket)
            .unwrap_or(false)
    }

    async fn send(&self, target: &DeliveryTarget<'_>, payload: &[u8]) -> ViscaResult<()> {
        let socket = target
            .session
            .and_then(|s| s.raw_socket())
            .ok_or_else(|| ViscaError::UnsupportedCapability("raw socket".into()))?;
        match timeout(self.send_timeout, socket.send(payload)).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(ViscaError::timeout("raw socket send", self.send_timeout)),
        }
    }
}

/// Ordered strategy chain
pub struct TransportDispatcher {
    strategies: Vec<Box<dyn TransportStrategy>>,
    config: TransportConfig,
}

impl TransportDispatcher {
    /// The four built-in strategies in priority order
    pub fn standard(config: TransportConfig) -> Self {
        let strategies: Vec<Box<dyn TransportStrategy>> = vec![
            Box::new(SessionStrategy),
            Box::new(StreamStrategy::new(&config)),
            Box::new(DatagramStrategy::new(&config)),
            Box::new(RawHandleStrategy::new(&config)),
        ];
        Self { strategies, config }
    }

    /// Custom chain, tried in the given order
    pub fn with_strategies(
        strategies: Vec<Box<dyn TransportStrategy>>,
        config: TransportConfig,
    ) -> Self {
        Self { strategies, config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn strategy_kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Try each strategy in order and report which one delivered the payload
    pub async fn try_deliver(
        &self,
        target: &DeliveryTarget<'_>,
        payload: &[u8],
    ) -> ViscaResult<StrategyKind> {
        let budget = self.config.attempt_timeout();
        let mut attempts = 0;

        for strategy in &self.strategies {
            let kind = strategy.kind();
            if !strategy.is_applicable(target) {
                debug!("Skipping {} for {}", kind, target.endpoint);
                continue;
            }
            attempts += 1;

            match timeout(budget, strategy.send(target, payload)).await {
                Ok(Ok(())) => {
                    debug!("Delivered {:02X?} to {} via {}", payload, target.endpoint, kind);
                    return Ok(kind);
                }
                Ok(Err(e)) if e.is_unsupported() => {
                    debug!("{} unsupported for {}: {}", kind, target.endpoint, e);
                    attempts -= 1;
                }
                Ok(Err(e)) => {
                    debug!("{} failed for {}: {}", kind, target.endpoint, e);
                }
                Err(_) => {
                    debug!("{} timed out after {:?} for {}", kind, budget, target.endpoint);
                }
            }
        }

        Err(ViscaError::TransportExhausted {
            endpoint: target.endpoint.to_string(),
            attempts,
        })
    }

    /// Deliver a payload, reporting success as a flag. Never fails.
    pub async fn deliver(&self, target: &DeliveryTarget<'_>, payload: &[u8]) -> bool {
        match self.try_deliver(target, payload).await {
            Ok(_) => true,
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod recording {
    //! Scripted strategies that record every attempt

    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Attempt {
        pub kind: StrategyKind,
        pub endpoint: CameraEndpoint,
        pub payload: Vec<u8>,
    }

    pub type AttemptLog = Arc<Mutex<Vec<Attempt>>>;
    type Outcome = Arc<dyn Fn(&CameraEndpoint, &[u8]) -> bool + Send + Sync>;

    pub struct RecordingStrategy {
        kind: StrategyKind,
        applicable: bool,
        outcome: Outcome,
        log: AttemptLog,
    }

    impl RecordingStrategy {
        pub fn new(
            kind: StrategyKind,
            log: &AttemptLog,
            outcome: impl Fn(&CameraEndpoint, &[u8]) -> bool + Send + Sync + 'static,
        ) -> Self {
            Self {
                kind,
                applicable: true,
                outcome: Arc::new(outcome),
                log: Arc::clone(log),
            }
        }

        pub fn succeeding(kind: StrategyKind, log: &AttemptLog) -> Self {
            Self::new(kind, log, |_, _| true)
        }

        pub fn failing(kind: StrategyKind, log: &AttemptLog) -> Self {
            Self::new(kind, log, |_, _| false)
        }

        pub fn inapplicable(mut self) -> Self {
            self.applicable = false;
            self
        }
    }

    #[async_trait]
    impl TransportStrategy for RecordingStrategy {
        fn kind(&self) -> StrategyKind {
            self.kind
        }

        fn is_applicable(&self, _target: &DeliveryTarget<'_>) -> bool {
            self.applicable
        }

        async fn send(&self, target: &DeliveryTarget<'_>, payload: &[u8]) -> ViscaResult<()> {
            self.log.lock().unwrap().push(Attempt {
                kind: self.kind,
                endpoint: target.endpoint.clone(),
                payload: payload.to_vec(),
            });
            if (self.outcome)(target.endpoint, payload) {
                Ok(())
            } else {
                Err(ViscaError::connection_refused(target.endpoint.address(), "scripted failure"))
            }
        }
    }

    pub fn new_log() -> AttemptLog {
        Arc::new(Mutex::new(Vec::new()))
    }

    pub fn kinds(log: &AttemptLog) -> Vec<StrategyKind> {
        log.lock().unwrap().iter().map(|a| a.kind).collect()
    }
}
