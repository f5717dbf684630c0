//! Camera registry
//!
//! Ordered list of configured cameras (the index is the camera id), the active
//! selection and a best-effort cache of each camera's last known position.
//! The registry never talks to a device itself.

use crate::session::ControlSession;
use crate::CameraEndpoint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Last known position of a camera, as reported by its inquiries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CachedPosition {
    pub pan: i16,
    pub tilt: i16,
    pub zoom_ratio: u16,
}

/// Everything needed to address one camera
#[derive(Clone)]
pub struct CameraHandle {
    pub index: usize,
    pub endpoint: CameraEndpoint,
    pub session: Option<Arc<dyn ControlSession>>,
}

struct CameraSlot {
    endpoint: CameraEndpoint,
    session: Option<Arc<dyn ControlSession>>,
}

#[derive(Default)]
struct RegistryState {
    slots: Vec<CameraSlot>,
    active: usize,
    positions: HashMap<usize, CachedPosition>,
}

/// Thread-safe registry of configured cameras
#[derive(Default)]
pub struct CameraRegistry {
    state: RwLock<RegistryState>,
}

impl CameraRegistry {
    /// Registry with session-less cameras; the first one is active
    pub fn new(endpoints: Vec<CameraEndpoint>) -> Self {
        let slots = endpoints
            .into_iter()
            .map(|endpoint| CameraSlot {
                endpoint,
                session: None,
            })
            .collect();
        Self {
            state: RwLock::new(RegistryState {
                slots,
                active: 0,
                positions: HashMap::new(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.read().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().slots.is_empty()
    }

    /// All endpoints in index order
    pub fn endpoints(&self) -> Vec<CameraEndpoint> {
        self.read().slots.iter().map(|s| s.endpoint.clone()).collect()
    }

    /// Display names in index order
    pub fn names(&self) -> Vec<String> {
        self.read().slots.iter().map(|s| s.endpoint.name.clone()).collect()
    }

    pub fn endpoint(&self, index: usize) -> Option<CameraEndpoint> {
        self.read().slots.get(index).map(|s| s.endpoint.clone())
    }

    /// Active index, `None` when no cameras are configured
    pub fn active_index(&self) -> Option<usize> {
        let state = self.read();
        (state.active < state.slots.len()).then_some(state.active)
    }

    /// Select the active camera. Out-of-range indices are ignored.
    pub fn set_active(&self, index: usize) -> bool {
        let mut state = self.write();
        if index >= state.slots.len() {
            debug!("Ignoring active camera {} (have {})", index, state.slots.len());
            return false;
        }
        state.active = index;
        true
    }

    pub fn handle(&self, index: usize) -> Option<CameraHandle> {
        self.read().slots.get(index).map(|slot| CameraHandle {
            index,
            endpoint: slot.endpoint.clone(),
            session: slot.session.clone(),
        })
    }

    /// Endpoint and session of the active camera
    pub fn active_handle(&self) -> Option<CameraHandle> {
        let index = self.active_index()?;
        self.handle(index)
    }

    /// Swap the camera at `index`, dropping its old session and cached position
    pub fn replace(
        &self,
        index: usize,
        endpoint: CameraEndpoint,
        session: Option<Arc<dyn ControlSession>>,
    ) -> bool {
        let mut state = self.write();
        let Some(slot) = state.slots.get_mut(index) else {
            return false;
        };
        *slot = CameraSlot { endpoint, session };
        state.positions.remove(&index);
        true
    }

    /// Attach a session to `index` if it still holds `endpoint`
    pub fn attach_session(
        &self,
        index: usize,
        endpoint: &CameraEndpoint,
        session: Arc<dyn ControlSession>,
    ) -> bool {
        let mut state = self.write();
        match state.slots.get_mut(index) {
            Some(slot) if slot.endpoint == *endpoint => {
                slot.session = Some(session);
                true
            }
            _ => false,
        }
    }

    pub fn position(&self, index: usize) -> Option<CachedPosition> {
        self.read().positions.get(&index).copied()
    }

    pub fn set_position(&self, index: usize, position: CachedPosition) -> bool {
        let mut state = self.write();
        if index >= state.slots.len() {
            return false;
        }
        state.positions.insert(index, position);
        true
    }
}
