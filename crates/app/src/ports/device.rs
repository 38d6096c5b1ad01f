//! Device port — the physical interface the line source reads from.

use std::future::Future;

use tokio::io::AsyncRead;

use soilgate_domain::error::GatewayError;

/// An input device that can be opened into a byte stream.
///
/// The serial adapter implements this over a tty; tests use in-memory
/// duplex pipes.
pub trait Device: Send + Sync {
    /// Byte stream produced by a successful [`open`](Self::open).
    type Stream: AsyncRead + Unpin + Send + 'static;

    /// Human-readable description for logs (e.g. `/dev/ttyUSB0@9600`).
    fn describe(&self) -> String;

    /// Claim the device.
    ///
    /// Dropping the returned stream releases the device.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DeviceUnavailable`] when the device cannot be
    /// claimed.
    fn open(&self) -> impl Future<Output = Result<Self::Stream, GatewayError>> + Send;
}
