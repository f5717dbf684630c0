//! Application configuration
//!
//! One JSON document holds the camera list, the gamepad mapping, the analog
//! joystick wiring and control tuning. Every section falls back to defaults
//! when missing, so partial or older files still load.

use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use viscapad_input::{AnalogJoystickConfig, InputMapping, PollConfig};
use viscapad_visca::command::MAX_PAN_TILT_SPEED;
use viscapad_visca::{
    CameraEndpoint, ControlConfig, TransportConfig, ZeroMotion, VISCA_DEFAULT_PORT,
};

/// A configured camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub name: String,
    #[serde(alias = "ip")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    VISCA_DEFAULT_PORT
}

impl CameraConfig {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }

    pub fn endpoint(&self) -> CameraEndpoint {
        CameraEndpoint::new(self.name.clone(), self.host.clone(), self.port)
    }
}

impl From<&CameraEndpoint> for CameraConfig {
    fn from(endpoint: &CameraEndpoint) -> Self {
        Self::new(endpoint.name.clone(), endpoint.host.clone(), endpoint.port)
    }
}

/// Gamepad selection and mapping
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GamepadConfig {
    pub mapping: InputMapping,
    /// Device activated at startup, if any
    pub device_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Open a VISCA-over-IP session per camera
    pub enabled: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Steering and transport tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    /// Pan/tilt speed at full stick deflection (1..=24)
    pub max_speed: u8,
    pub zero_motion: ZeroMotion,
    pub session: SessionSettings,
    pub connect_timeout_ms: u64,
    pub send_timeout_ms: u64,
    pub inquiry_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            max_speed: 12,
            zero_motion: ZeroMotion::ExplicitStop,
            session: SessionSettings::default(),
            connect_timeout_ms: 300,
            send_timeout_ms: 300,
            inquiry_timeout_ms: 500,
            poll_interval_ms: 20,
        }
    }
}

impl ControlSettings {
    /// Max speed held in 1..=24
    pub fn max_speed(&self) -> u8 {
        self.max_speed.clamp(1, MAX_PAN_TILT_SPEED)
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            inquiry_timeout: Duration::from_millis(self.inquiry_timeout_ms),
        }
    }

    pub fn control(&self) -> ControlConfig {
        ControlConfig {
            zero_motion: self.zero_motion,
            open_sessions: self.session.enabled,
        }
    }

    pub fn poll(&self) -> PollConfig {
        PollConfig {
            tick_interval: Duration::from_millis(self.poll_interval_ms),
            ..PollConfig::default()
        }
    }
}

/// Everything the application persists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cameras: Vec<CameraConfig>,
    pub gamepad: GamepadConfig,
    pub joystick: AnalogJoystickConfig,
    pub control: ControlSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cameras: (0..3)
                .map(|i| {
                    CameraConfig::new(
                        format!("Camera {}", i + 1),
                        format!("192.168.1.{}", 100 + i),
                        VISCA_DEFAULT_PORT,
                    )
                })
                .collect(),
            gamepad: GamepadConfig::default(),
            joystick: AnalogJoystickConfig::default(),
            control: ControlSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load from a JSON file; a missing file yields the defaults
    pub fn load(path: &Path) -> BridgeResult<Self> {
        if !path.exists() {
            tracing::info!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> BridgeResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        tracing::debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.control.max_speed == 0 || self.control.max_speed > MAX_PAN_TILT_SPEED {
            return Err(BridgeError::Config(format!(
                "max_speed must be 1..={}, got {}",
                MAX_PAN_TILT_SPEED, self.control.max_speed
            )));
        }
        if self.control.poll_interval_ms == 0 {
            return Err(BridgeError::Config("poll_interval_ms must be positive".into()));
        }
        if let Some(camera) = self.cameras.iter().find(|c| c.host.trim().is_empty()) {
            return Err(BridgeError::Config(format!("camera '{}' has no host", camera.name)));
        }
        self.joystick
            .channels()
            .map_err(|e| BridgeError::Config(format!("joystick: {}", e)))?;
        Ok(())
    }

    pub fn endpoints(&self) -> Vec<CameraEndpoint> {
        self.cameras.iter().map(CameraConfig::endpoint).collect()
    }
}
