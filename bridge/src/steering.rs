//! Joystick to camera steering
//!
//! Turns the polled pan/tilt/zoom triple and button edges into camera
//! commands. Nonzero speeds are sent every tick; returning to rest sends a
//! single stop for that motion.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::debug;
use viscapad_input::{AxisValues, ButtonAction, ButtonEvent};
use viscapad_visca::command::{MAX_PAN_TILT_SPEED, MAX_ZOOM_SPEED};

/// The camera operations steering needs
pub trait CameraCommands: Send + Sync {
    fn move_camera(&self, pan: i32, tilt: i32) -> bool;
    fn zoom_camera(&self, speed: f64) -> bool;
    fn stop_camera(&self) -> bool;
}

/// What a preset button does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetMode {
    Recall,
    Store,
}

impl fmt::Display for PresetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresetMode::Recall => f.write_str("recall"),
            PresetMode::Store => f.write_str("store"),
        }
    }
}

#[derive(Debug, Default)]
struct MotionState {
    pan_tilt_moving: bool,
    stick_zoom_moving: bool,
    /// Zoom speed held by a zoom button
    button_zoom: Option<i32>,
}

pub struct Steering {
    max_speed: AtomicU8,
    store_mode: AtomicBool,
    motion: Mutex<MotionState>,
}

impl Steering {
    pub fn new(max_speed: u8) -> Self {
        Self {
            max_speed: AtomicU8::new(max_speed.clamp(1, MAX_PAN_TILT_SPEED)),
            store_mode: AtomicBool::new(false),
            motion: Mutex::new(MotionState::default()),
        }
    }

    pub fn max_speed(&self) -> u8 {
        self.max_speed.load(Ordering::Relaxed)
    }

    pub fn set_max_speed(&self, speed: u8) {
        self.max_speed
            .store(speed.clamp(1, MAX_PAN_TILT_SPEED), Ordering::Relaxed);
    }

    pub fn preset_mode(&self) -> PresetMode {
        if self.store_mode.load(Ordering::SeqCst) {
            PresetMode::Store
        } else {
            PresetMode::Recall
        }
    }

    fn toggle_preset_mode(&self) -> PresetMode {
        self.store_mode.fetch_xor(true, Ordering::SeqCst);
        self.preset_mode()
    }

    /// Integer speeds for a sample. Stick up reads negative, camera up is positive.
    pub fn speeds(&self, values: AxisValues) -> (i32, i32, i32) {
        let max = self.max_speed() as f32;
        (
            (values.pan * max).trunc() as i32,
            (-values.tilt * max).trunc() as i32,
            (values.zoom * MAX_ZOOM_SPEED as f32).trunc() as i32,
        )
    }

    pub fn on_values(&self, values: AxisValues, cameras: &dyn CameraCommands) {
        let (pan, tilt, zoom) = self.speeds(values);
        let mut motion = self.motion.lock().unwrap_or_else(PoisonError::into_inner);

        if pan != 0 || tilt != 0 {
            cameras.move_camera(pan, tilt);
            motion.pan_tilt_moving = true;
        } else if motion.pan_tilt_moving {
            cameras.move_camera(0, 0);
            motion.pan_tilt_moving = false;
        }

        // A held zoom button overrides the stick
        if motion.button_zoom.is_some() {
            return;
        }
        if zoom != 0 {
            cameras.zoom_camera(zoom as f64);
            motion.stick_zoom_moving = true;
        } else if motion.stick_zoom_moving {
            cameras.zoom_camera(0.0);
            motion.stick_zoom_moving = false;
        }
    }

    pub fn on_button(&self, event: ButtonEvent, cameras: &dyn CameraCommands) {
        let zoom_speed = MAX_ZOOM_SPEED as i32;
        match (event.action, event.pressed) {
            (ButtonAction::ZoomIn, true) => self.start_button_zoom(zoom_speed, cameras),
            (ButtonAction::ZoomOut, true) => self.start_button_zoom(-zoom_speed, cameras),
            (ButtonAction::ZoomIn, false) => self.end_button_zoom(zoom_speed, cameras),
            (ButtonAction::ZoomOut, false) => self.end_button_zoom(-zoom_speed, cameras),
            (ButtonAction::Stop, true) => {
                cameras.stop_camera();
                let mut motion = self.motion.lock().unwrap_or_else(PoisonError::into_inner);
                *motion = MotionState::default();
            }
            (ButtonAction::PresetStoreToggle, true) => {
                let mode = self.toggle_preset_mode();
                debug!("Preset buttons now {}", mode);
            }
            _ => {}
        }
    }

    fn start_button_zoom(&self, speed: i32, cameras: &dyn CameraCommands) {
        let mut motion = self.motion.lock().unwrap_or_else(PoisonError::into_inner);
        cameras.zoom_camera(speed as f64);
        motion.button_zoom = Some(speed);
        motion.stick_zoom_moving = false;
    }

    fn end_button_zoom(&self, speed: i32, cameras: &dyn CameraCommands) {
        let mut motion = self.motion.lock().unwrap_or_else(PoisonError::into_inner);
        // Releasing the other zoom button leaves this one running
        if motion.button_zoom == Some(speed) {
            cameras.zoom_camera(0.0);
            motion.button_zoom = None;
        }
    }
}
