//! Device selection and activation

use crate::device::{DeviceBackend, DeviceInfo};
use crate::mapping::InputMapping;
use crate::normalizer::{AxisValues, ButtonEvent};
use crate::session::{ButtonHandler, InputPollingSession, PollConfig, ValueHandler};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// Owns the input backend and at most one polling session.
///
/// Value and button handlers are fixed at construction so activation only
/// needs a device index and a mapping.
pub struct ControllerManager {
    backend: Box<dyn DeviceBackend>,
    session: InputPollingSession,
    active: Mutex<Option<usize>>,
    on_values: ValueHandler,
    on_button: ButtonHandler,
}

impl ControllerManager {
    pub fn new(
        backend: Box<dyn DeviceBackend>,
        config: PollConfig,
        on_values: impl Fn(AxisValues) + Send + Sync + 'static,
        on_button: impl Fn(ButtonEvent) + Send + Sync + 'static,
    ) -> Self {
        Self {
            backend,
            session: InputPollingSession::new(config),
            active: Mutex::new(None),
            on_values: Arc::new(on_values),
            on_button: Arc::new(on_button),
        }
    }

    /// Manager without handlers, for callers that only read `get_values`
    pub fn passive(backend: Box<dyn DeviceBackend>, config: PollConfig) -> Self {
        Self::new(backend, config, |_| {}, |_| {})
    }

    pub fn list_input_devices(&self) -> Vec<DeviceInfo> {
        self.backend.list_devices()
    }

    /// Start polling device `index`. Any active device is released first.
    pub fn activate_device(&self, index: usize, mapping: InputMapping) -> bool {
        self.deactivate();

        let opener = match self.backend.opener(index) {
            Ok(opener) => opener,
            Err(e) => {
                warn!("Cannot activate input device {}: {}", index, e);
                return false;
            }
        };
        match self.session.start(
            opener,
            mapping,
            Arc::clone(&self.on_values),
            Arc::clone(&self.on_button),
        ) {
            Ok(name) => {
                info!("Activated input device {} ({})", index, name);
                *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(index);
                true
            }
            Err(e) => {
                warn!("Cannot activate input device {}: {}", index, e);
                false
            }
        }
    }

    /// Stop polling. The last values stay readable.
    pub fn deactivate(&self) {
        self.session.stop();
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Index of the device being polled
    pub fn active_device(&self) -> Option<usize> {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_mapping(&self, mapping: InputMapping) {
        self.session.set_mapping(mapping);
    }

    pub fn get_mapping(&self) -> InputMapping {
        self.session.mapping()
    }

    pub fn get_values(&self) -> AxisValues {
        self.session.get_values()
    }
}
