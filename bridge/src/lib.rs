//! Synchronous PTZ control surface
//!
//! `PtzBridge` is what the UI talks to. It owns the configuration, a small
//! tokio runtime for the camera command layer, the gamepad controller manager
//! and the steering glue between them. Every call blocks the caller for at
//! most one transport chain and reports failure as `false`.
//!
//! Calls must come from outside any tokio runtime.

pub mod config;
mod error;
pub mod logging;
pub mod steering;

pub use config::{AppConfig, CameraConfig, ControlSettings, GamepadConfig};
pub use error::{BridgeError, BridgeResult};
pub use logging::init_logging;
pub use steering::{CameraCommands, PresetMode, Steering};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::{Handle, Runtime};
use tracing::{info, warn};
use viscapad_input::{default_backend, ControllerManager, DeviceBackend, DeviceKind, InputMapping};
use viscapad_visca::{CachedPosition, CameraControlService};

/// Called with the new configuration after mapping or camera changes
pub type PersistCallback = Box<dyn Fn(&AppConfig) + Send + Sync>;

/// Blocking access to the async service from non-runtime threads
struct RuntimeCameras {
    handle: Handle,
    service: Arc<CameraControlService>,
}

impl CameraCommands for RuntimeCameras {
    fn move_camera(&self, pan: i32, tilt: i32) -> bool {
        self.handle.block_on(self.service.move_camera(pan, tilt))
    }

    fn zoom_camera(&self, speed: f64) -> bool {
        self.handle.block_on(self.service.zoom_camera(speed))
    }

    fn stop_camera(&self) -> bool {
        self.handle.block_on(self.service.stop_camera())
    }
}

fn build_runtime() -> BridgeResult<Runtime> {
    match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("viscapad-rt")
        .enable_all()
        .build()
    {
        Ok(rt) => Ok(rt),
        Err(e) => {
            warn!("Failed to create single-worker runtime: {}", e);
            Runtime::new().map_err(|e| BridgeError::Runtime(e.to_string()))
        }
    }
}

/// Start the first listed gamepad. The analog joystick is never picked here.
fn activate_first_gamepad(controllers: &ControllerManager, mapping: &InputMapping) {
    let first = controllers
        .list_input_devices()
        .into_iter()
        .find(|d| d.kind == DeviceKind::Gamepad);
    match first {
        Some(pad) if controllers.activate_device(pad.index, mapping.clone()) => {
            info!("Using first available gamepad {} ({})", pad.index, pad.name);
        }
        Some(pad) => warn!("First available gamepad {} did not start", pad.name),
        None => info!("No gamepad attached"),
    }
}

pub struct PtzBridge {
    controllers: ControllerManager,
    cameras: Arc<RuntimeCameras>,
    steering: Arc<Steering>,
    config: Mutex<AppConfig>,
    persist: Option<PersistCallback>,
    // Dropped last; the poll thread blocks on it until the manager stops
    runtime: Runtime,
}

impl PtzBridge {
    /// Bridge over the platform's gamepad and analog joystick backends
    pub fn new(config: AppConfig) -> BridgeResult<Self> {
        let backend = default_backend(&config.joystick);
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: AppConfig, backend: Box<dyn DeviceBackend>) -> BridgeResult<Self> {
        config.validate()?;
        let runtime = build_runtime()?;

        let service = Arc::new(CameraControlService::with_endpoints(
            config.endpoints(),
            config.control.transport(),
            config.control.control(),
        ));
        runtime.block_on(service.open_sessions());

        let cameras = Arc::new(RuntimeCameras {
            handle: runtime.handle().clone(),
            service,
        });
        let steering = Arc::new(Steering::new(config.control.max_speed()));

        let controllers = {
            let (value_steering, value_cameras) = (Arc::clone(&steering), Arc::clone(&cameras));
            let (button_steering, button_cameras) = (Arc::clone(&steering), Arc::clone(&cameras));
            ControllerManager::new(
                backend,
                config.control.poll(),
                move |values| value_steering.on_values(values, value_cameras.as_ref()),
                move |event| button_steering.on_button(event, button_cameras.as_ref()),
            )
        };
        controllers.set_mapping(config.gamepad.mapping.clone());

        match config.gamepad.device_index {
            Some(index) => {
                if !controllers.activate_device(index, config.gamepad.mapping.clone()) {
                    warn!("Configured gamepad {} is not available", index);
                }
            }
            None => activate_first_gamepad(&controllers, &config.gamepad.mapping),
        }

        info!("PTZ bridge ready with {} cameras", config.cameras.len());
        Ok(Self {
            controllers,
            cameras,
            steering,
            config: Mutex::new(config),
            persist: None,
            runtime,
        })
    }

    /// Register the callback run after persisted settings change
    pub fn on_persist(mut self, callback: impl Fn(&AppConfig) + Send + Sync + 'static) -> Self {
        self.persist = Some(Box::new(callback));
        self
    }

    fn service(&self) -> &CameraControlService {
        &self.cameras.service
    }

    fn config_lock(&self) -> MutexGuard<'_, AppConfig> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_config(&self, change: impl FnOnce(&mut AppConfig)) {
        let snapshot = {
            let mut config = self.config_lock();
            change(&mut config);
            config.clone()
        };
        if let Some(persist) = &self.persist {
            persist(&snapshot);
        }
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> AppConfig {
        self.config_lock().clone()
    }

    pub fn list_cameras(&self) -> Vec<String> {
        self.service().list_cameras()
    }

    pub fn active_camera(&self) -> Option<usize> {
        self.service().active_camera()
    }

    pub fn cached_position(&self, index: usize) -> Option<CachedPosition> {
        self.service().cached_position(index)
    }

    pub fn move_camera(&self, pan: i32, tilt: i32) -> bool {
        self.cameras.move_camera(pan, tilt)
    }

    pub fn zoom_camera(&self, speed: f64) -> bool {
        self.cameras.zoom_camera(speed)
    }

    pub fn zoom_to_ratio(&self, ratio: u32) -> bool {
        self.runtime.block_on(self.service().zoom_to_ratio(ratio))
    }

    pub fn stop_camera(&self) -> bool {
        self.cameras.stop_camera()
    }

    pub fn store_preset(&self, slot: u8) -> bool {
        self.runtime.block_on(self.service().store_preset(slot))
    }

    pub fn recall_preset(&self, slot: u8) -> bool {
        self.runtime.block_on(self.service().recall_preset(slot))
    }

    /// Store or recall `slot` depending on the preset mode
    pub fn preset(&self, slot: u8) -> bool {
        match self.steering.preset_mode() {
            PresetMode::Store => self.store_preset(slot),
            PresetMode::Recall => self.recall_preset(slot),
        }
    }

    pub fn preset_mode(&self) -> PresetMode {
        self.steering.preset_mode()
    }

    pub fn set_active_camera(&self, index: usize) -> bool {
        self.runtime.block_on(self.service().set_active_camera(index))
    }

    /// Replace camera `index` and persist the camera list
    pub fn update_camera(&self, index: usize, name: &str, host: &str, port: u16) -> bool {
        if !self
            .runtime
            .block_on(self.service().update_endpoint(index, name, host, port))
        {
            return false;
        }
        self.update_config(|config| {
            if let Some(camera) = config.cameras.get_mut(index) {
                *camera = CameraConfig::new(name, host, port);
            }
        });
        true
    }

    /// Pan/tilt speed at full stick deflection
    pub fn set_max_speed(&self, speed: u8) {
        self.steering.set_max_speed(speed);
        let speed = self.steering.max_speed();
        self.update_config(|config| config.control.max_speed = speed);
    }

    pub fn get_values(&self) -> (f32, f32, f32) {
        self.controllers.get_values().as_tuple()
    }

    pub fn list_input_devices(&self) -> Vec<(usize, String)> {
        self.controllers
            .list_input_devices()
            .into_iter()
            .map(|d| (d.index, d.name))
            .collect()
    }

    pub fn activate_device(&self, index: usize, mapping: InputMapping) -> bool {
        if !self.controllers.activate_device(index, mapping.clone()) {
            return false;
        }
        let mapping = mapping.sanitized();
        self.update_config(|config| {
            config.gamepad.device_index = Some(index);
            config.gamepad.mapping = mapping;
        });
        true
    }

    /// Switch input to the analog joystick with its configured channels and
    /// deadzone. The gamepad selection in the config is left alone.
    pub fn activate_analog(&self) -> bool {
        let joystick = self.config_lock().joystick.clone();
        let analog = self
            .controllers
            .list_input_devices()
            .into_iter()
            .find(|d| d.kind == DeviceKind::AnalogJoystick);
        match analog {
            Some(device) => self.controllers.activate_device(device.index, joystick.mapping()),
            None => {
                warn!("No analog joystick available");
                false
            }
        }
    }

    pub fn active_device(&self) -> Option<usize> {
        self.controllers.active_device()
    }

    pub fn set_mapping(&self, mapping: InputMapping) {
        let mapping = mapping.sanitized();
        self.controllers.set_mapping(mapping.clone());
        self.update_config(|config| config.gamepad.mapping = mapping);
    }

    pub fn get_mapping(&self) -> InputMapping {
        self.controllers.get_mapping()
    }

    /// Stop polling and halt the active camera
    pub fn shutdown(&self) {
        self.controllers.deactivate();
        if !self.stop_camera() {
            warn!("Could not stop the active camera during shutdown");
        }
        info!("PTZ bridge shut down");
    }
}

impl Drop for PtzBridge {
    fn drop(&mut self) {
        self.controllers.deactivate();
    }
}
