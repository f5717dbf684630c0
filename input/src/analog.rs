//! Analog joystick on an MCP3008 SPI ADC
//!
//! Three potentiometers (pan, tilt, zoom) sit on ADC channels picked in
//! [`AnalogJoystickConfig`]. The opened device exposes them as axes 0, 1 and 2,
//! each 10-bit reading rescaled from [0, 1] to [-1, 1]. It has no buttons.

use crate::mapping::InputMapping;
use crate::{InputError, InputResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Single-ended inputs on an MCP3008
pub const MCP3008_CHANNELS: u8 = 8;

const MCP3008_FULL_SCALE: u16 = 1023;

/// Where the analog joystick is wired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalogJoystickConfig {
    /// List the joystick when its SPI device node exists
    pub enabled: bool,
    pub spi_bus: u8,
    pub chip_select: u8,
    pub x_pin: u8,
    pub y_pin: u8,
    pub zoom_pin: u8,
    pub deadzone: f32,
}

impl Default for AnalogJoystickConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            spi_bus: 0,
            chip_select: 0,
            x_pin: 0,
            y_pin: 1,
            zoom_pin: 2,
            deadzone: 0.1,
        }
    }
}

impl AnalogJoystickConfig {
    /// spidev node for the configured bus and chip select
    pub fn device_path(&self) -> PathBuf {
        PathBuf::from(format!("/dev/spidev{}.{}", self.spi_bus, self.chip_select))
    }

    /// ADC channels for pan, tilt and zoom, checked against the chip
    pub fn channels(&self) -> InputResult<[u8; 3]> {
        let channels = [self.x_pin, self.y_pin, self.zoom_pin];
        match channels.iter().find(|&&c| c >= MCP3008_CHANNELS) {
            Some(&bad) => Err(InputError::InvalidChannel(bad)),
            None => Ok(channels),
        }
    }

    /// Mapping that reads the three channel axes with this joystick's deadzone
    pub fn mapping(&self) -> InputMapping {
        InputMapping {
            pan_axis: 0,
            tilt_axis: 1,
            zoom_axis: 2,
            deadzone: self.deadzone,
            ..InputMapping::default()
        }
        .sanitized()
    }
}

/// SPI frame requesting a single-ended conversion on `channel`
pub fn mcp3008_request(channel: u8) -> [u8; 3] {
    [0x01, 0x80 | ((channel & 0x07) << 4), 0x00]
}

/// 10-bit result from the reply to [`mcp3008_request`]
pub fn mcp3008_decode(reply: &[u8; 3]) -> u16 {
    (u16::from(reply[1] & 0x03) << 8) | u16::from(reply[2])
}

/// Raw conversion to [-1, 1]
pub fn rescale(raw: u16) -> f32 {
    let fraction = f32::from(raw.min(MCP3008_FULL_SCALE)) / f32::from(MCP3008_FULL_SCALE);
    fraction * 2.0 - 1.0
}

#[cfg(target_os = "linux")]
pub use spi::{AnalogBackend, Mcp3008Joystick};

#[cfg(target_os = "linux")]
mod spi {
    use super::*;
    use crate::device::{DeviceBackend, DeviceInfo, DeviceKind, DeviceOpener, InputDevice};
    use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};
    use tracing::{debug, info, warn};

    const SPI_CLOCK_HZ: u32 = 1_000_000;

    /// An opened MCP3008 joystick
    pub struct Mcp3008Joystick {
        spi: Spidev,
        name: String,
        channels: [u8; 3],
        axes: [f32; 3],
        connected: bool,
    }

    impl Mcp3008Joystick {
        pub fn open(config: &AnalogJoystickConfig) -> InputResult<Self> {
            let channels = config.channels()?;
            let path = config.device_path();
            let unavailable = |e: std::io::Error| {
                InputError::DeviceUnavailable(format!("{}: {}", path.display(), e))
            };

            let mut spi = Spidev::open(&path).map_err(unavailable)?;
            let options = SpidevOptions::new()
                .bits_per_word(8)
                .max_speed_hz(SPI_CLOCK_HZ)
                .mode(SpiModeFlags::SPI_MODE_0)
                .build();
            spi.configure(&options).map_err(unavailable)?;

            info!("Opened analog joystick on {} channels {:?}", path.display(), channels);
            Ok(Self {
                spi,
                name: joystick_name(config),
                channels,
                axes: [0.0; 3],
                connected: true,
            })
        }

        fn read_channel(&mut self, channel: u8) -> std::io::Result<u16> {
            let request = mcp3008_request(channel);
            let mut reply = [0u8; 3];
            {
                let mut transfer = SpidevTransfer::read_write(&request, &mut reply);
                self.spi.transfer(&mut transfer)?;
            }
            Ok(mcp3008_decode(&reply))
        }
    }

    impl InputDevice for Mcp3008Joystick {
        fn name(&self) -> &str {
            &self.name
        }

        fn pump(&mut self) -> bool {
            let mut readings = [0.0f32; 3];
            for (slot, channel) in readings.iter_mut().zip(self.channels) {
                match self.read_channel(channel) {
                    Ok(raw) => *slot = rescale(raw),
                    Err(e) => {
                        if self.connected {
                            warn!("{} read failed: {}", self.name, e);
                        }
                        self.connected = false;
                        return false;
                    }
                }
            }
            self.axes = readings;
            self.connected = true;
            true
        }

        fn axis(&self, index: usize) -> Option<f32> {
            if !self.connected {
                return None;
            }
            self.axes.get(index).copied()
        }

        fn button(&self, _index: usize) -> Option<bool> {
            None
        }
    }

    fn joystick_name(config: &AnalogJoystickConfig) -> String {
        format!("Analog joystick ({})", config.device_path().display())
    }

    /// Lists the MCP3008 joystick when its spidev node is present
    #[derive(Debug, Clone)]
    pub struct AnalogBackend {
        config: AnalogJoystickConfig,
    }

    impl AnalogBackend {
        pub fn new(config: AnalogJoystickConfig) -> Self {
            Self { config }
        }

        fn present(&self) -> bool {
            let present = self.config.enabled && self.config.device_path().exists();
            debug!("Analog joystick present: {}", present);
            present
        }
    }

    impl DeviceBackend for AnalogBackend {
        fn list_devices(&self) -> Vec<DeviceInfo> {
            if !self.present() {
                return Vec::new();
            }
            vec![DeviceInfo {
                index: 0,
                name: joystick_name(&self.config),
                kind: DeviceKind::AnalogJoystick,
            }]
        }

        fn opener(&self, index: usize) -> InputResult<DeviceOpener> {
            let len = usize::from(self.present());
            if index >= len {
                return Err(InputError::InvalidIndex { index, len });
            }
            let config = self.config.clone();
            Ok(Box::new(move || {
                Mcp3008Joystick::open(&config).map(|d| Box::new(d) as Box<dyn InputDevice>)
            }))
        }
    }
}
