//! Serial adapter error types.

use soilgate_domain::error::GatewayError;

/// Errors specific to the serial adapter.
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    /// The settings cannot describe a usable port.
    #[error("invalid serial configuration: {0}")]
    InvalidConfig(&'static str),

    /// The operating system refused to open the port.
    #[error("failed to open serial port {path}")]
    Open {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },
}

impl SerialError {
    /// Device path the error refers to, if any.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::InvalidConfig(_) => None,
            Self::Open { path, .. } => Some(path),
        }
    }
}

impl From<SerialError> for GatewayError {
    fn from(err: SerialError) -> Self {
        let path = err.path().unwrap_or("<unset>").to_string();
        GatewayError::DeviceUnavailable {
            path,
            source: Box::new(err),
        }
    }
}
