//! Input device abstraction

use crate::analog::AnalogJoystickConfig;
use crate::{InputError, InputResult};

/// An opened joystick or gamepad.
///
/// Devices are owned by the polling thread, so they only need to be `Send`.
pub trait InputDevice: Send {
    fn name(&self) -> &str;

    /// Refresh cached state from the hardware. Returns `false` once the
    /// device has gone away; readings are then unavailable.
    fn pump(&mut self) -> bool;

    /// Axis `index` scaled to [-1, 1], `None` if the device has no such axis
    fn axis(&self, index: usize) -> Option<f32>;

    /// Button `index`, `None` if the device has no such button
    fn button(&self, index: usize) -> Option<bool>;
}

/// Opens a device; runs on the polling thread
pub type DeviceOpener = Box<dyn FnOnce() -> InputResult<Box<dyn InputDevice>> + Send>;

/// What sort of controller a device is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Gamepad,
    AnalogJoystick,
}

/// A device as listed to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub kind: DeviceKind,
}

/// Source of input devices
pub trait DeviceBackend: Send + Sync {
    /// Currently attached devices, indexed from 0
    fn list_devices(&self) -> Vec<DeviceInfo>;

    /// Opener for device `index`, or an error if there is no such device
    fn opener(&self, index: usize) -> InputResult<DeviceOpener>;
}

/// Backend with no devices, for platforms without joystick support
#[derive(Debug, Default)]
pub struct EmptyBackend;

impl DeviceBackend for EmptyBackend {
    fn list_devices(&self) -> Vec<DeviceInfo> {
        Vec::new()
    }

    fn opener(&self, index: usize) -> InputResult<DeviceOpener> {
        Err(InputError::InvalidIndex { index, len: 0 })
    }
}

/// Several backends listed one after another under a single index space
pub struct CompositeBackend {
    backends: Vec<Box<dyn DeviceBackend>>,
}

impl CompositeBackend {
    pub fn new(backends: Vec<Box<dyn DeviceBackend>>) -> Self {
        Self { backends }
    }
}

impl DeviceBackend for CompositeBackend {
    fn list_devices(&self) -> Vec<DeviceInfo> {
        let mut devices = Vec::new();
        for backend in &self.backends {
            let offset = devices.len();
            devices.extend(backend.list_devices().into_iter().map(|mut d| {
                d.index += offset;
                d
            }));
        }
        devices
    }

    fn opener(&self, index: usize) -> InputResult<DeviceOpener> {
        let mut local = index;
        let mut len = 0;
        for backend in &self.backends {
            let count = backend.list_devices().len();
            if local < count {
                return backend.opener(local);
            }
            local -= count;
            len += count;
        }
        Err(InputError::InvalidIndex { index, len })
    }
}

/// The platform's native backend: gamepads first, then the analog joystick
pub fn default_backend(joystick: &AnalogJoystickConfig) -> Box<dyn DeviceBackend> {
    #[cfg(target_os = "linux")]
    {
        let gamepads = Box::new(crate::evdev_backend::EvdevBackend::new());
        if !joystick.enabled {
            return gamepads;
        }
        Box::new(CompositeBackend::new(vec![
            gamepads,
            Box::new(crate::analog::AnalogBackend::new(joystick.clone())),
        ]))
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = joystick;
        Box::new(EmptyBackend)
    }
}
