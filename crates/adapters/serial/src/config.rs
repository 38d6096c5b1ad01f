//! Serial port configuration.

use serde::Deserialize;

use crate::error::SerialError;

/// Which serial port to open and how.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path (`/dev/ttyUSB0`, `COM5`, ...).
    pub path: String,
    /// Line speed in baud.
    pub baud_rate: u32,
}

impl SerialConfig {
    /// Check the settings before touching the device.
    ///
    /// # Errors
    ///
    /// Returns [`SerialError::InvalidConfig`] for an empty path or a zero
    /// baud rate.
    pub fn validate(&self) -> Result<(), SerialError> {
        if self.path.trim().is_empty() {
            return Err(SerialError::InvalidConfig("serial path must not be empty"));
        }
        if self.baud_rate == 0 {
            return Err(SerialError::InvalidConfig("baud rate must be non-zero"));
        }
        Ok(())
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
        }
    }
}
