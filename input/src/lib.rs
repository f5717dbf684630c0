//! Joystick and gamepad input for PTZ steering
//!
//! USB gamepads come from evdev and an analog joystick from an MCP3008 ADC
//! on SPI, both on Linux. Devices are sampled on a background thread, mapped
//! to a normalized pan/tilt/zoom triple and turned into discrete button edges.

pub mod analog;
pub mod device;
mod error;
#[cfg(target_os = "linux")]
pub mod evdev_backend;
pub mod manager;
pub mod mapping;
pub mod normalizer;
pub mod session;

pub use analog::AnalogJoystickConfig;
pub use device::{
    default_backend, CompositeBackend, DeviceBackend, DeviceInfo, DeviceKind, EmptyBackend,
    InputDevice,
};
pub use error::{InputError, InputResult};
pub use manager::ControllerManager;
pub use mapping::{ButtonAction, InputMapping};
pub use normalizer::{AxisValues, ButtonEvent};
pub use session::{InputPollingSession, PollConfig};
