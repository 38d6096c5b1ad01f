//! Gateway lifecycle — the process-wide state machine and shutdown reasons.

use std::fmt;

use crate::error::InvalidTransition;

/// Process-wide lifecycle state.
///
/// Transitions are strictly monotonic and never skip a state:
/// `Starting → Running → ShuttingDown → Stopped`. A gateway that fails to
/// start still walks `Starting → ShuttingDown → Stopped` so that whatever was
/// opened gets released through the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GatewayState {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

impl GatewayState {
    /// Check and perform a transition to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] for any move that goes backwards, stays
    /// in place, or skips a state (except the aborted-start edge
    /// `Starting → ShuttingDown`).
    pub fn advance(self, next: Self) -> Result<Self, InvalidTransition> {
        let allowed = matches!(
            (self, next),
            (Self::Starting, Self::Running | Self::ShuttingDown)
                | (Self::Running, Self::ShuttingDown)
                | (Self::ShuttingDown, Self::Stopped)
        );
        if allowed {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for GatewayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Why the gateway is shutting down. The first reason recorded wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// External termination signal (`SIGINT`, `SIGTERM`, …).
    Signal(String),
    /// The input device failed mid-run.
    DeviceFault(String),
    /// The subscriber endpoint stopped serving unexpectedly.
    EndpointFault(String),
    /// A task panicked.
    Panic(String),
    /// Startup could not complete.
    StartupFailed(String),
}

impl ShutdownReason {
    /// Whether this shutdown was caused by a fault rather than a request.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        !matches!(self, Self::Signal(_))
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(name) => write!(f, "received {name}"),
            Self::DeviceFault(msg) => write!(f, "device fault: {msg}"),
            Self::EndpointFault(msg) => write!(f, "endpoint fault: {msg}"),
            Self::Panic(msg) => write!(f, "panic: {msg}"),
            Self::StartupFailed(msg) => write!(f, "startup failed: {msg}"),
        }
    }
}
