//! Linux joysticks and gamepads through evdev
//!
//! Axis and button numbering follows the SDL joystick convention: axis *i* is
//! the *i*-th absolute axis the device reports in event-code order, button *i*
//! is the *i*-th key at or above `BTN_MISC`.

use crate::device::{DeviceBackend, DeviceInfo, DeviceKind, DeviceOpener, InputDevice};
use crate::{InputError, InputResult};
use evdev::{AbsoluteAxisType, Device, Key};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const BTN_JOYSTICK: u16 = 0x120;
const BTN_GAMEPAD_LAST: u16 = 0x13F;

fn is_game_controller(device: &Device) -> bool {
    let has_axes = device
        .supported_absolute_axes()
        .map(|axes| axes.iter().next().is_some())
        .unwrap_or(false);
    let has_pad_buttons = device
        .supported_keys()
        .map(|keys| {
            keys.iter()
                .any(|k| (BTN_JOYSTICK..=BTN_GAMEPAD_LAST).contains(&k.code()))
        })
        .unwrap_or(false);
    has_axes && has_pad_buttons
}

fn scale(value: i32, minimum: i32, maximum: i32) -> f32 {
    if maximum <= minimum {
        return 0.0;
    }
    let span = (i64::from(maximum) - i64::from(minimum)) as f64;
    let offset = (i64::from(value) - i64::from(minimum)) as f64;
    let scaled = (offset / span * 2.0 - 1.0) as f32;
    scaled.clamp(-1.0, 1.0)
}

/// An opened evdev game controller
pub struct EvdevDevice {
    device: Device,
    name: String,
    axes: Vec<AbsoluteAxisType>,
    keys: Vec<Key>,
    axis_values: Vec<f32>,
    button_values: Vec<bool>,
    connected: bool,
}

impl EvdevDevice {
    pub fn open(path: &Path) -> InputResult<Self> {
        let device = Device::open(path)
            .map_err(|e| InputError::DeviceUnavailable(format!("{}: {}", path.display(), e)))?;
        let name = device.name().unwrap_or("Unknown controller").to_string();

        let axes: Vec<AbsoluteAxisType> = device
            .supported_absolute_axes()
            .map(|set| set.iter().collect())
            .unwrap_or_default();
        let keys: Vec<Key> = device
            .supported_keys()
            .map(|set| set.iter().filter(|k| k.code() >= Key::BTN_0.code()).collect())
            .unwrap_or_default();

        info!(
            "Opened {} ({} axes, {} buttons) at {}",
            name,
            axes.len(),
            keys.len(),
            path.display()
        );
        Ok(Self {
            axis_values: vec![0.0; axes.len()],
            button_values: vec![false; keys.len()],
            device,
            name,
            axes,
            keys,
            connected: true,
        })
    }
}

impl InputDevice for EvdevDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn pump(&mut self) -> bool {
        let abs = match self.device.get_abs_state() {
            Ok(abs) => abs,
            Err(e) => {
                if self.connected {
                    warn!("{} disconnected: {}", self.name, e);
                }
                self.connected = false;
                return false;
            }
        };
        let keys = match self.device.get_key_state() {
            Ok(keys) => keys,
            Err(e) => {
                if self.connected {
                    warn!("{} disconnected: {}", self.name, e);
                }
                self.connected = false;
                return false;
            }
        };

        for (slot, axis) in self.axis_values.iter_mut().zip(&self.axes) {
            if let Some(info) = abs.get(axis.0 as usize) {
                *slot = scale(info.value, info.minimum, info.maximum);
            }
        }
        for (slot, key) in self.button_values.iter_mut().zip(&self.keys) {
            *slot = keys.contains(*key);
        }
        self.connected = true;
        true
    }

    fn axis(&self, index: usize) -> Option<f32> {
        if !self.connected {
            return None;
        }
        self.axis_values.get(index).copied()
    }

    fn button(&self, index: usize) -> Option<bool> {
        if !self.connected {
            return None;
        }
        self.button_values.get(index).copied()
    }
}

/// Enumerates `/dev/input/event*` game controllers
#[derive(Debug, Default)]
pub struct EvdevBackend;

impl EvdevBackend {
    pub fn new() -> Self {
        Self
    }

    fn controllers(&self) -> Vec<(PathBuf, String)> {
        let mut found: Vec<(PathBuf, String)> = evdev::enumerate()
            .filter(|(_, device)| is_game_controller(device))
            .map(|(path, device)| {
                let name = device.name().unwrap_or("Unknown controller").to_string();
                (path, name)
            })
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        debug!("Found {} game controllers", found.len());
        found
    }
}

impl DeviceBackend for EvdevBackend {
    fn list_devices(&self) -> Vec<DeviceInfo> {
        self.controllers()
            .into_iter()
            .enumerate()
            .map(|(index, (_, name))| DeviceInfo {
                index,
                name,
                kind: DeviceKind::Gamepad,
            })
            .collect()
    }

    fn opener(&self, index: usize) -> InputResult<DeviceOpener> {
        let controllers = self.controllers();
        let len = controllers.len();
        let (path, _) = controllers
            .into_iter()
            .nth(index)
            .ok_or(InputError::InvalidIndex { index, len })?;
        Ok(Box::new(move || {
            EvdevDevice::open(&path).map(|d| Box::new(d) as Box<dyn InputDevice>)
        }))
    }
}
