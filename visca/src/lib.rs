//! VISCA-over-IP camera control
//!
//! This crate turns PTZ intents into VISCA payloads and delivers them to
//! network cameras:
//! - [`command`]: pure payload encoding and reply decoding
//! - [`session`]: long-lived VISCA-over-IP sessions with framed send and inquiries
//! - [`transport`]: the ordered chain of delivery strategies
//! - [`registry`]: configured cameras, active selection, position cache
//! - [`service`]: the `bool`-returning façade the UI calls

pub mod command;
mod endpoint;
mod error;
pub mod registry;
pub mod service;
pub mod session;
pub mod transport;

pub use command::{PresetNumbering, PtzCommand};
pub use endpoint::CameraEndpoint;
pub use error::{ViscaError, ViscaResult};
pub use registry::{CachedPosition, CameraRegistry};
pub use service::{CameraControlService, ControlConfig, ZeroMotion};
pub use session::{ControlSession, SessionCapabilities, ViscaSession};
pub use transport::{TransportConfig, TransportDispatcher, TransportStrategy};

/// Default VISCA-over-IP UDP port
pub const VISCA_DEFAULT_PORT: u16 = 52381;
