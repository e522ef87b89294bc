//! Dome error types

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by dome devices and configuration
#[derive(Debug, Error)]
pub enum DomeError {
    /// A blocking wait for a limit switch did not complete in time
    #[error("Limit switch timeout on {device} waiting for {switch} after {timeout:?}")]
    LimitSwitchTimeout {
        device: String,
        switch: String,
        timeout: Duration,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot read configuration {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Hardware backend not available: {0}")]
    HardwareUnavailable(String),
}

impl DomeError {
    /// Create a limit switch timeout error
    pub fn limit_switch_timeout(
        device: impl Into<String>,
        switch: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        DomeError::LimitSwitchTimeout {
            device: device.into(),
            switch: switch.into(),
            timeout,
        }
    }
}

/// Result type for dome operations
pub type DomeResult<T> = Result<T, DomeError>;
