//! VISCA error types
//!
//! These never cross the public façade: `CameraControlService` turns them into
//! `false` after logging. Inside the crate they carry enough context to tell a
//! skipped transport from a failed one.

use std::time::Duration;
use thiserror::Error;

/// Result alias for the command layer
pub type ViscaResult<T> = Result<T, ViscaError>;

/// Errors raised by transports, sessions and the registry
#[derive(Debug, Error)]
pub enum ViscaError {
    #[error("Timeout after {duration_ms}ms during {operation}")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("Connection refused: {address} - {cause}")]
    ConnectionRefused { address: String, cause: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not resolve {0}")]
    AddressResolution(String),

    #[error("Transport does not support {0}")]
    UnsupportedCapability(String),

    #[error("Camera index {index} out of range (have {len})")]
    InvalidIndex { index: usize, len: usize },

    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    #[error("All {attempts} transports failed for {endpoint}")]
    TransportExhausted { endpoint: String, attempts: usize },
}

impl ViscaError {
    /// Create a timeout error with operation context
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        ViscaError::Timeout {
            operation: operation.into(),
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Create a connection refused error
    pub fn connection_refused(address: impl Into<String>, cause: impl ToString) -> Self {
        ViscaError::ConnectionRefused {
            address: address.into(),
            cause: cause.to_string(),
        }
    }

    /// A skipped transport, not a failed one
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ViscaError::UnsupportedCapability(_))
    }
}

impl From<ViscaError> for String {
    fn from(err: ViscaError) -> Self {
        err.to_string()
    }
}
