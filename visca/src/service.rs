//! Camera control façade
//!
//! `CameraControlService` composes the encoder, the registry and the transport
//! dispatcher. Every operation reports success as a `bool`; failures are
//! logged here and never propagate to the caller.

use crate::command::{
    decode_pan_tilt_position, decode_zoom_position, quantize_zoom_speed, PresetNumbering,
    PtzCommand, PAN_TILT_POSITION_INQUIRY, ZOOM_POSITION_INQUIRY,
};
use crate::registry::{CachedPosition, CameraHandle, CameraRegistry};
use crate::session::{ControlSession, ViscaSession};
use crate::transport::{DeliveryTarget, TransportConfig, TransportDispatcher};
use crate::{CameraEndpoint, ViscaError, ViscaResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What `move_camera(0, 0)` puts on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroMotion {
    /// The explicit pan/tilt stop opcode
    #[default]
    ExplicitStop,
    /// A drive command with idle directions and minimal speeds
    DriveCommand,
}

/// Behaviour switches for the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlConfig {
    pub zero_motion: ZeroMotion,
    /// Open a VISCA-over-IP session for each camera when it is registered
    pub open_sessions: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            zero_motion: ZeroMotion::ExplicitStop,
            open_sessions: true,
        }
    }
}

/// The operations the UI drives cameras with
pub struct CameraControlService {
    registry: CameraRegistry,
    dispatcher: TransportDispatcher,
    config: ControlConfig,
}

impl CameraControlService {
    pub fn new(
        registry: CameraRegistry,
        dispatcher: TransportDispatcher,
        config: ControlConfig,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            config,
        }
    }

    /// Service over the standard transport chain
    pub fn with_endpoints(
        endpoints: Vec<CameraEndpoint>,
        transport: TransportConfig,
        config: ControlConfig,
    ) -> Self {
        Self::new(
            CameraRegistry::new(endpoints),
            TransportDispatcher::standard(transport),
            config,
        )
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn registry(&self) -> &CameraRegistry {
        &self.registry
    }

    /// Open sessions for every registered camera; returns how many opened
    pub async fn open_sessions(&self) -> usize {
        if !self.config.open_sessions {
            return 0;
        }
        let mut opened = 0;
        for (index, endpoint) in self.registry.endpoints().into_iter().enumerate() {
            if self.open_session(index, &endpoint).await {
                opened += 1;
            }
        }
        info!("Opened {} of {} camera sessions", opened, self.registry.len());
        opened
    }

    async fn open_session(&self, index: usize, endpoint: &CameraEndpoint) -> bool {
        match ViscaSession::open(endpoint).await {
            Ok(session) => self
                .registry
                .attach_session(index, endpoint, Arc::new(session)),
            Err(e) => {
                debug!("No session for {}: {}", endpoint, e);
                false
            }
        }
    }

    pub fn list_cameras(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn active_camera(&self) -> Option<usize> {
        self.registry.active_index()
    }

    pub fn endpoint(&self, index: usize) -> Option<CameraEndpoint> {
        self.registry.endpoint(index)
    }

    pub fn cached_position(&self, index: usize) -> Option<CachedPosition> {
        self.registry.position(index)
    }

    async fn dispatch(
        &self,
        handle: &CameraHandle,
        command: PtzCommand,
        numbering: PresetNumbering,
    ) -> bool {
        let payload = command.encode_with(numbering);
        let target = DeliveryTarget::new(&handle.endpoint, handle.session.as_deref());
        let delivered = self.dispatcher.deliver(&target, &payload).await;
        if !delivered {
            warn!("Failed to send {} to {}", command.name(), handle.endpoint);
        }
        delivered
    }

    async fn dispatch_active(&self, command: PtzCommand) -> bool {
        match self.registry.active_handle() {
            Some(handle) => self.dispatch(&handle, command, PresetNumbering::OneBased).await,
            None => {
                debug!("No active camera for {}", command.name());
                false
            }
        }
    }

    /// Pan/tilt at speed; positive pan is right, positive tilt is up
    pub async fn move_camera(&self, pan: i32, tilt: i32) -> bool {
        let command = if pan == 0 && tilt == 0 {
            match self.config.zero_motion {
                ZeroMotion::ExplicitStop => PtzCommand::Stop,
                ZeroMotion::DriveCommand => PtzCommand::PanTiltDrive { pan: 0, tilt: 0 },
            }
        } else {
            PtzCommand::MoveAtSpeed { pan, tilt }
        };
        self.dispatch_active(command).await
    }

    /// Variable-speed zoom. Fractional nonzero speeds still move the lens.
    pub async fn zoom_camera(&self, speed: f64) -> bool {
        let command = match quantize_zoom_speed(speed) {
            0 => PtzCommand::ZoomStop,
            speed => PtzCommand::ZoomAtSpeed(speed),
        };
        self.dispatch_active(command).await
    }

    pub async fn zoom_to_ratio(&self, ratio: u32) -> bool {
        self.dispatch_active(PtzCommand::ZoomToRatio(ratio)).await
    }

    /// Stop pan/tilt and zoom. Both are attempted even if one fails.
    pub async fn stop_camera(&self) -> bool {
        let Some(handle) = self.registry.active_handle() else {
            return false;
        };
        let pan_tilt = self
            .dispatch(&handle, PtzCommand::Stop, PresetNumbering::OneBased)
            .await;
        let zoom = self
            .dispatch(&handle, PtzCommand::ZoomStop, PresetNumbering::OneBased)
            .await;
        pan_tilt && zoom
    }

    async fn preset(&self, command: PtzCommand) -> bool {
        let Some(handle) = self.registry.active_handle() else {
            return false;
        };
        for numbering in PresetNumbering::FALLBACK_ORDER {
            if self.dispatch(&handle, command, numbering).await {
                debug!("{} succeeded with {:?} numbering", command.name(), numbering);
                return true;
            }
        }
        false
    }

    /// Store the current position in a 1-based preset slot
    pub async fn store_preset(&self, slot: u8) -> bool {
        self.preset(PtzCommand::StorePreset(slot)).await
    }

    /// Recall a 1-based preset slot
    pub async fn recall_preset(&self, slot: u8) -> bool {
        self.preset(PtzCommand::RecallPreset(slot)).await
    }

    /// Select the active camera and opportunistically refresh its position
    pub async fn set_active_camera(&self, index: usize) -> bool {
        if !self.registry.set_active(index) {
            return false;
        }
        info!("Active camera is now {}", index);
        if let Err(e) = self.refresh_position(index).await {
            debug!("Position of camera {} not refreshed: {}", index, e);
        }
        true
    }

    /// Query the camera's position and cache it
    pub async fn refresh_position(&self, index: usize) -> ViscaResult<CachedPosition> {
        let handle = self.registry.handle(index).ok_or(ViscaError::InvalidIndex {
            index,
            len: self.registry.len(),
        })?;
        let session = handle
            .session
            .ok_or_else(|| ViscaError::UnsupportedCapability("inquiry without session".into()))?;
        let wait = self.dispatcher.config().inquiry_timeout;

        let reply = session.inquire(&PAN_TILT_POSITION_INQUIRY, wait).await?;
        let (pan, tilt) = decode_pan_tilt_position(&reply)
            .ok_or_else(|| ViscaError::MalformedReply(format!("pan/tilt {:02X?}", reply)))?;
        let reply = session.inquire(&ZOOM_POSITION_INQUIRY, wait).await?;
        let zoom_ratio = decode_zoom_position(&reply)
            .ok_or_else(|| ViscaError::MalformedReply(format!("zoom {:02X?}", reply)))?;

        let position = CachedPosition {
            pan,
            tilt,
            zoom_ratio,
        };
        self.registry.set_position(index, position);
        Ok(position)
    }

    /// Replace camera `index`. The camera does not need to be reachable.
    pub async fn update_endpoint(&self, index: usize, name: &str, host: &str, port: u16) -> bool {
        let endpoint = CameraEndpoint::new(name, host, port);
        if !self.registry.replace(index, endpoint.clone(), None) {
            return false;
        }
        info!("Camera {} is now {}", index, endpoint);
        if self.config.open_sessions {
            self.open_session(index, &endpoint).await;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionCapabilities;
    use crate::transport::recording::*;
    use crate::transport::{StrategyKind, TransportStrategy};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::net::UdpSocket;

    fn endpoints() -> Vec<CameraEndpoint> {
        vec![
            CameraEndpoint::new("Camera 1", "192.168.1.100", 52381),
            CameraEndpoint::new("Camera 2", "192.168.1.101", 52381),
        ]
    }

    fn no_sessions() -> ControlConfig {
        ControlConfig {
            open_sessions: false,
            ..ControlConfig::default()
        }
    }

    fn service_with(
        strategies: Vec<Box<dyn TransportStrategy>>,
        config: ControlConfig,
    ) -> CameraControlService {
        CameraControlService::new(
            CameraRegistry::new(endpoints()),
            TransportDispatcher::with_strategies(strategies, TransportConfig::quick()),
            config,
        )
    }

    fn payloads(log: &AttemptLog) -> Vec<Vec<u8>> {
        log.lock().unwrap().iter().map(|a| a.payload.clone()).collect()
    }

    #[tokio::test]
    async fn test_store_preset_tries_one_based_then_zero_based() {
        let log = new_log();
        let service = service_with(
            vec![Box::new(RecordingStrategy::failing(StrategyKind::Datagram, &log))],
            no_sessions(),
        );
        assert!(!service.store_preset(5).await);
        assert_eq!(
            payloads(&log),
            vec![
                vec![0x81, 0x01, 0x04, 0x3F, 0x01, 0x05, 0xFF],
                vec![0x81, 0x01, 0x04, 0x3F, 0x01, 0x04, 0xFF],
            ]
        );
    }

    #[tokio::test]
    async fn test_store_preset_stops_after_first_success() {
        let log = new_log();
        let service = service_with(
            vec![Box::new(RecordingStrategy::succeeding(StrategyKind::Datagram, &log))],
            no_sessions(),
        );
        assert!(service.store_preset(5).await);
        assert_eq!(payloads(&log), vec![vec![0x81, 0x01, 0x04, 0x3F, 0x01, 0x05, 0xFF]]);
    }

    #[tokio::test]
    async fn test_recall_preset_falls_back_to_zero_based() {
        let log = new_log();
        // Firmware that only accepts 0-based numbering
        let strategy = RecordingStrategy::new(StrategyKind::Datagram, &log, |_, payload| {
            payload[5] == 0x02
        });
        let service = service_with(vec![Box::new(strategy)], no_sessions());
        assert!(service.recall_preset(3).await);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_set_active_camera_scenario() {
        let log = new_log();
        let service = service_with(
            vec![Box::new(RecordingStrategy::succeeding(StrategyKind::Datagram, &log))],
            no_sessions(),
        );
        assert_eq!(service.active_camera(), Some(0));
        assert!(!service.set_active_camera(5).await);
        assert_eq!(service.active_camera(), Some(0));

        assert!(service.set_active_camera(1).await);
        assert!(service.move_camera(10, -10).await);

        let attempts = log.lock().unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].endpoint.host, "192.168.1.101");
        assert_eq!(
            attempts[0].payload,
            vec![0x81, 0x01, 0x06, 0x01, 0x0A, 0x0A, 0x02, 0x02, 0xFF]
        );
    }

    #[tokio::test]
    async fn test_zero_motion_modes() {
        let log = new_log();
        let service = service_with(
            vec![Box::new(RecordingStrategy::succeeding(StrategyKind::Datagram, &log))],
            no_sessions(),
        );
        assert!(service.move_camera(0, 0).await);

        let drive = ControlConfig {
            zero_motion: ZeroMotion::DriveCommand,
            open_sessions: false,
        };
        let service = service_with(
            vec![Box::new(RecordingStrategy::succeeding(StrategyKind::Datagram, &log))],
            drive,
        );
        assert!(service.move_camera(0, 0).await);

        assert_eq!(
            payloads(&log),
            vec![
                vec![0x81, 0x01, 0x06, 0x01, 0x00, 0x00, 0x03, 0x03, 0xFF],
                vec![0x81, 0x01, 0x06, 0x01, 0x01, 0x01, 0x03, 0x03, 0xFF],
            ]
        );
    }

    #[tokio::test]
    async fn test_zoom_fraction_never_stops() {
        let log = new_log();
        let service = service_with(
            vec![Box::new(RecordingStrategy::succeeding(StrategyKind::Datagram, &log))],
            no_sessions(),
        );
        service.zoom_camera(0.3).await;
        service.zoom_camera(-12.0).await;
        service.zoom_camera(0.0).await;
        let zoom_bytes: Vec<u8> = payloads(&log).iter().map(|p| p[4]).collect();
        assert_eq!(zoom_bytes, vec![0x21, 0x37, 0x00]);
    }

    #[tokio::test]
    async fn test_stop_sends_both_even_when_first_fails() {
        let log = new_log();
        let strategy = RecordingStrategy::new(StrategyKind::Datagram, &log, |_, payload| {
            payload[2] == 0x04
        });
        let service = service_with(vec![Box::new(strategy)], no_sessions());
        assert!(!service.stop_camera().await);
        assert_eq!(
            payloads(&log),
            vec![
                vec![0x81, 0x01, 0x06, 0x01, 0x00, 0x00, 0x03, 0x03, 0xFF],
                vec![0x81, 0x01, 0x04, 0x07, 0x00, 0xFF],
            ]
        );
    }

    #[tokio::test]
    async fn test_no_active_camera_returns_false() {
        let log = new_log();
        let service = CameraControlService::new(
            CameraRegistry::new(Vec::new()),
            TransportDispatcher::with_strategies(
                vec![Box::new(RecordingStrategy::succeeding(StrategyKind::Datagram, &log))],
                TransportConfig::quick(),
            ),
            no_sessions(),
        );
        assert!(!service.move_camera(3, 3).await);
        assert!(!service.stop_camera().await);
        assert!(!service.recall_preset(1).await);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_endpoint_without_reachability() {
        let service = service_with(Vec::new(), no_sessions());
        assert!(service.update_endpoint(1, "Balcony", "10.1.2.3", 1259).await);
        assert_eq!(
            service.endpoint(1),
            Some(CameraEndpoint::new("Balcony", "10.1.2.3", 1259))
        );
        assert!(!service.update_endpoint(4, "Nowhere", "10.1.2.4", 1259).await);
        assert_eq!(service.list_cameras(), vec!["Camera 1", "Balcony"]);
    }

    struct ScriptedSession;

    #[async_trait]
    impl ControlSession for ScriptedSession {
        fn capabilities(&self) -> SessionCapabilities {
            SessionCapabilities {
                command_send: false,
                raw_socket: false,
            }
        }

        async fn send_command(&self, _payload: &[u8]) -> ViscaResult<()> {
            Err(ViscaError::UnsupportedCapability("send".into()))
        }

        async fn inquire(&self, payload: &[u8], _wait: Duration) -> ViscaResult<Vec<u8>> {
            if payload == PAN_TILT_POSITION_INQUIRY {
                Ok(vec![0x90, 0x50, 0x00, 0x00, 0x01, 0x00, 0x0F, 0x0F, 0x0F, 0x0F, 0xFF])
            } else {
                Ok(vec![0x90, 0x50, 0x00, 0x03, 0x0E, 0x08, 0xFF])
            }
        }
    }

    #[tokio::test]
    async fn test_set_active_camera_caches_position() {
        let service = service_with(Vec::new(), no_sessions());
        let endpoint = service.endpoint(1).unwrap();
        assert!(service
            .registry()
            .attach_session(1, &endpoint, Arc::new(ScriptedSession)));

        assert!(service.set_active_camera(1).await);
        assert_eq!(
            service.cached_position(1),
            Some(CachedPosition {
                pan: 0x0010,
                tilt: -1,
                zoom_ratio: 1000,
            })
        );
        // Camera without a session: selection still succeeds
        assert!(service.set_active_camera(0).await);
        assert_eq!(service.cached_position(0), None);
    }

    #[tokio::test]
    async fn test_end_to_end_over_loopback_session() {
        let camera = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = camera.local_addr().unwrap().port();
        let service = CameraControlService::with_endpoints(
            vec![CameraEndpoint::new("Loop", "127.0.0.1", port)],
            TransportConfig::quick(),
            ControlConfig::default(),
        );
        assert_eq!(service.open_sessions().await, 1);
        assert!(service.zoom_to_ratio(0x1234).await);

        let mut buf = [0u8; 64];
        let (len, _) = camera.recv_from(&mut buf).await.unwrap();
        let (_, payload) = crate::session::parse_frame(&buf[..len]).unwrap();
        assert_eq!(payload, &[0x81, 0x01, 0x04, 0x47, 0x01, 0x02, 0x03, 0x04, 0xFF]);
    }
}
