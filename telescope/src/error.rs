//! Telescope error types

use std::time::Duration;
use thiserror::Error;

/// Errors raised by telescope drivers
#[derive(Debug, Error)]
pub enum TelescopeError {
    #[error("Connection to {address} failed: {message}")]
    ConnectionFailed { address: String, message: String },

    #[error("Connection to {address} timed out after {duration:?}")]
    ConnectionTimeout { address: String, duration: Duration },

    /// No response within the I/O timeout
    #[error("Timed out after {duration:?} waiting for {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Not connected")]
    NotConnected,

    /// The device answered with something the driver does not understand
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// The device reported an error code
    #[error("Device error code {0}")]
    Device(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TelescopeError {
    /// Whether the error means the mount cannot be reached at all
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            TelescopeError::ConnectionFailed { .. }
                | TelescopeError::ConnectionTimeout { .. }
                | TelescopeError::NotConnected
                | TelescopeError::Io(_)
        )
    }
}

impl From<quick_xml::Error> for TelescopeError {
    fn from(err: quick_xml::Error) -> Self {
        TelescopeError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for TelescopeError {
    fn from(err: serde_json::Error) -> Self {
        TelescopeError::Parse(err.to_string())
    }
}

/// Result type for telescope operations
pub type TelescopeResult<T> = Result<T, TelescopeError>;
