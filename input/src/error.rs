//! Input layer errors

use thiserror::Error;

pub type InputResult<T> = Result<T, InputError>;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Input device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Device index {index} out of range (have {len})")]
    InvalidIndex { index: usize, len: usize },

    #[error("Input backend error: {0}")]
    Backend(String),

    #[error("Device did not open within {0}ms")]
    OpenTimeout(u64),

    #[error("ADC channel {0} out of range")]
    InvalidChannel(u8),
}

impl From<std::io::Error> for InputError {
    fn from(err: std::io::Error) -> Self {
        InputError::Backend(err.to_string())
    }
}

impl From<InputError> for String {
    fn from(err: InputError) -> Self {
        err.to_string()
    }
}
