//! # soilgate-adapter-serial
//!
//! Serial adapter — implements the [`Device`] port over a serial port.
//!
//! ## Responsibilities
//! - Open the configured tty at the configured baud rate (8N1, no flow control)
//! - Hand the resulting async byte stream to the line source
//! - Translate open failures into [`GatewayError::DeviceUnavailable`]
//!
//! ## Dependency rule
//! Same as other adapters: depends on `soilgate-app` and `soilgate-domain`.

mod config;
mod error;

use std::future::Future;

use tokio_serial::{SerialPortBuilderExt, SerialStream};

use soilgate_app::ports::Device;
use soilgate_domain::error::GatewayError;

pub use config::SerialConfig;
pub use error::SerialError;

/// Serial port input device.
#[derive(Debug, Clone)]
pub struct SerialDevice {
    config: SerialConfig,
}

impl SerialDevice {
    #[must_use]
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn open_stream(&self) -> Result<SerialStream, SerialError> {
        self.config.validate()?;
        tokio_serial::new(&self.config.path, self.config.baud_rate)
            .open_native_async()
            .map_err(|source| SerialError::Open {
                path: self.config.path.clone(),
                source,
            })
    }
}

impl Device for SerialDevice {
    type Stream = SerialStream;

    fn describe(&self) -> String {
        format!("{}@{}", self.config.path, self.config.baud_rate)
    }

    fn open(&self) -> impl Future<Output = Result<SerialStream, GatewayError>> + Send {
        // Registration with the reactor happens here, inside the runtime.
        let result = self.open_stream().map_err(GatewayError::from);
        if result.is_ok() {
            tracing::info!(
                path = %self.config.path,
                baud = self.config.baud_rate,
                "serial port opened"
            );
        }
        async move { result }
    }
}
