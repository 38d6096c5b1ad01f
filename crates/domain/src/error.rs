//! Error taxonomy shared across the workspace.
//!
//! Only startup failures ([`GatewayError::DeviceUnavailable`],
//! [`GatewayError::Bind`]) stop the process on their own. Every other variant is contained where it occurs. A device IO
//! error becomes a shutdown request, and a transport error only removes the
//! affected subscriber.

use std::time::Duration;

use crate::lifecycle::GatewayState;

/// Base error for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The input device could not be claimed at startup.
    #[error("input device {path} is unavailable")]
    DeviceUnavailable {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The input device failed while running.
    #[error("input device IO error")]
    DeviceIo(#[source] std::io::Error),

    /// A subscriber sink rejected an event.
    #[error("subscriber transport error")]
    SubscriberTransport(#[from] SinkError),

    /// A resource did not close within the grace period.
    #[error("{resource} did not close within {grace:?}")]
    ShutdownTimeout {
        resource: &'static str,
        grace: Duration,
    },

    /// The subscriber endpoint could not bind its listening socket.
    #[error("failed to bind subscriber endpoint on {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The subscriber endpoint stopped serving.
    #[error("subscriber endpoint failed")]
    Endpoint(#[source] std::io::Error),

    /// The hub has been closed by shutdown and takes no new subscribers.
    #[error("broadcast hub is closed")]
    HubClosed,

    /// A lifecycle transition was attempted out of order.
    #[error(transparent)]
    Lifecycle(#[from] InvalidTransition),
}

/// Why a sink refused an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The subscriber is not keeping up and its queue is full.
    #[error("subscriber queue is full")]
    Full,
    /// The subscriber's transport is gone.
    #[error("subscriber transport is closed")]
    Closed,
}

/// Attempted lifecycle transition that breaks monotonic ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid lifecycle transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: GatewayState,
    pub to: GatewayState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_device_unavailable_with_path() {
        let err = GatewayError::DeviceUnavailable {
            path: "/dev/ttyUSB0".to_string(),
            source: Box::new(std::io::Error::from(std::io::ErrorKind::NotFound)),
        };
        assert_eq!(err.to_string(), "input device /dev/ttyUSB0 is unavailable");
    }

    #[test]
    fn should_convert_sink_error() {
        let err: GatewayError = SinkError::Closed.into();
        assert!(matches!(
            err,
            GatewayError::SubscriberTransport(SinkError::Closed)
        ));
    }

    #[test]
    fn should_display_shutdown_timeout() {
        let err = GatewayError::ShutdownTimeout {
            resource: "subscriber sessions",
            grace: Duration::from_secs(1),
        };
        assert_eq!(err.to_string(), "subscriber sessions did not close within 1s");
    }

    #[test]
    fn should_display_invalid_transition_transparently() {
        let err: GatewayError = InvalidTransition {
            from: GatewayState::Stopped,
            to: GatewayState::Running,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "invalid lifecycle transition from stopped to running"
        );
    }
}
