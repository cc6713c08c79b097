//! OBD-II Error Types

use thiserror::Error;

/// Errors that can occur while talking to an OBD-II adapter
#[derive(Debug, Error)]
pub enum ObdError {
    /// Write or read failure on the byte-stream
    #[error("Communication error: {0}")]
    Communication(String),

    /// Timeout waiting for the adapter prompt
    #[error("Timeout waiting for OBD response after {0}ms")]
    Timeout(u64),

    /// No byte-stream is attached to the engine
    #[error("OBD adapter is not connected")]
    NotConnected,

    /// The adapter answered with a status message instead of data
    #[error("Adapter reported: {0}")]
    AdapterReported(String),

    /// Echoed mode/PID header does not match the request
    #[error("Header mismatch: expected {expected:02X?}, got {actual:02X?}")]
    HeaderMismatch { expected: Vec<u8>, actual: Vec<u8> },

    /// Trailing checksum byte does not match the frame sum
    #[error("Checksum mismatch: expected {expected:02X}, got {actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// PID has no decode formula
    #[error("PID {0:04X} has no decode formula")]
    UnsupportedParameter(u16),

    /// Response is too short or contains unparseable tokens
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Request cannot be encoded
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse error classification used by callers and the retry layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Communication,
    FrameValidation,
    UnsupportedParameter,
    MalformedResponse,
}

impl ObdError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ObdError::Communication(_)
            | ObdError::Timeout(_)
            | ObdError::NotConnected
            | ObdError::AdapterReported(_) => ErrorKind::Communication,
            ObdError::HeaderMismatch { .. } | ObdError::ChecksumMismatch { .. } => {
                ErrorKind::FrameValidation
            }
            ObdError::UnsupportedParameter(_) => ErrorKind::UnsupportedParameter,
            ObdError::MalformedResponse(_)
            | ObdError::InvalidRequest(_)
            | ObdError::Config(_) => ErrorKind::MalformedResponse,
        }
    }

    /// Shorthand for a response that lacks the byte at `index`
    pub(crate) fn missing_byte(index: usize, len: usize) -> Self {
        ObdError::MalformedResponse(format!(
            "need byte at index {index}, frame has {len} bytes"
        ))
    }
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::Communication(err.to_string())
    }
}

impl From<tokio_serial::Error> for ObdError {
    fn from(err: tokio_serial::Error) -> Self {
        ObdError::Communication(err.to_string())
    }
}

impl From<config::ConfigError> for ObdError {
    fn from(err: config::ConfigError) -> Self {
        ObdError::Config(err.to_string())
    }
}
